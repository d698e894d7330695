// This file is part of yash, an extended POSIX shell.
// Copyright (C) 2025 WATANABE Yuki
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! This crate turns redirections into file descriptor operations that can be
//! performed in a forked child process.
//!
//! Redirections are performed in the child process between `fork` and
//! `exec`. In that window, the only things the child can safely do are
//! primitive system calls like `dup2` and `close`: it must not allocate
//! memory, take locks, or report errors in the usual way. This crate
//! therefore splits the job into two phases.
//!
//! In the parent process, redirection [directives](directive::Directive)
//! and the pipes and capture descriptors the shell needs internally are
//! collected into an [`IoChain`](chain::IoChain). The chain is then
//! [resolved](plan::Plan::resolve) into a [`Plan`](plan::Plan), an ordered
//! list of [`dup2` and `close` actions](plan::DupAction).
//!
//! In the child process, the plan is
//! [applied](plan::Plan::apply_in_child) action by action. Applying the plan
//! never allocates. If an action fails, the child exits with
//! [`EXIT_STATUS_SETUP_FAILED`](exec::EXIT_STATUS_SETUP_FAILED).
//!
//! The parent can also ask a plan what a file descriptor will refer to
//! after the plan is applied, using [`Plan::resolve_target`]. This is used
//! to save and restore file descriptors around built-ins that run without
//! forking.
//!
//! ```
//! use yash_fdplan::chain::{IoChain, IoEntry};
//! use yash_fdplan::io::Fd;
//! use yash_fdplan::plan::{DupAction, Plan};
//!
//! let mut chain = IoChain::new();
//! chain.push(IoEntry::Pipe { target: Fd::STDOUT, pipe_fd: Fd(7) });
//! chain.push(IoEntry::FdDup { target: Fd::STDERR, source: Fd::STDOUT });
//!
//! let plan = Plan::resolve(&chain);
//! assert_eq!(
//!     plan.actions(),
//!     [
//!         DupAction::Dup2 { src: Fd(7), target: Fd::STDOUT },
//!         DupAction::Close { fd: Fd(7) },
//!         DupAction::Dup2 { src: Fd::STDOUT, target: Fd::STDERR },
//!     ]
//! );
//! assert_eq!(plan.resolve_target(Fd::STDERR), Fd(7));
//! ```
//!
//! [`Plan::resolve_target`]: plan::Plan::resolve_target

pub mod chain;
pub mod context;
pub mod directive;
pub mod exec;
pub mod io;
pub mod plan;
pub mod system;
#[cfg(any(test, feature = "test-helper"))]
pub mod r#virtual;

#[doc(no_inline)]
pub use self::io::Fd;
#[doc(no_inline)]
pub use self::plan::Plan;
