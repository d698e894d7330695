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

//! Plans of `dup2` and `close` actions
//!
//! # Resolving a chain
//!
//! [`Plan::resolve`] converts an [`IoChain`] into a [`Plan`], processing the
//! entries in order:
//!
//! | Entry | Actions |
//! |-------|---------|
//! | `File { target, opened }` | `dup2(opened, target)` |
//! | `Close { target }` | `close(target)` |
//! | `FdDup { target, source }` | `dup2(source, target)` |
//! | `Pipe { target, pipe_fd }` | `dup2(pipe_fd, target)`, `close(pipe_fd)` |
//! | `BufferFill { target, write_fd }` | `dup2(write_fd, target)`, `close(write_fd)` |
//!
//! Entries are not reordered or merged. In particular, the plan does not
//! break cycles: swapping two file descriptors with `1>&2 2>&1` does not
//! swap them, just like in a shell that performs the redirections one by
//! one.
//!
//! Every FD that is the target of a `dup2` action is inherited by the
//! program the child executes, even if the action copies an FD onto itself
//! (see [`FdSystem::dup2`]).
//!
//! # Building and applying
//!
//! A plan must be built in the parent process, where it is safe to allocate
//! memory. [`PlanBuilder`] is the only way to construct a plan, and both
//! `PlanBuilder::new` and `Plan::resolve` panic in a
//! [forked child](crate::context::mark_forked_child). Once built, a `Plan`
//! cannot be modified. It is applied in the child process with
//! [`Plan::apply_in_child`] or [`Plan::execute`].

use crate::chain::IoChain;
use crate::chain::IoEntry;
use crate::context::assert_not_forked_child;
use crate::io::Fd;
use crate::system::ActionError;
use crate::system::FdSystem;

/// Primitive action in a [`Plan`]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DupAction {
    /// `dup2(src, target)`
    Dup2 {
        /// File descriptor to copy
        src: Fd,
        /// File descriptor to be replaced
        target: Fd,
    },
    /// `close(fd)`
    Close {
        /// File descriptor to close
        fd: Fd,
    },
}

impl std::fmt::Display for DupAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DupAction::Dup2 { src, target } => write!(f, "dup2({src}, {target})"),
            DupAction::Close { fd } => write!(f, "close({fd})"),
        }
    }
}

/// Builder for a [`Plan`]
///
/// The builder collects actions in the parent process.
/// [`build`](Self::build) freezes them into a `Plan`.
#[derive(Debug)]
#[must_use = "a builder does nothing unless built into a plan"]
pub struct PlanBuilder {
    actions: Vec<DupAction>,
}

impl PlanBuilder {
    /// Creates an empty builder.
    ///
    /// # Panics
    ///
    /// If the current process has been
    /// [marked as a forked child](crate::context::mark_forked_child).
    #[track_caller]
    pub fn new() -> Self {
        assert_not_forked_child();
        PlanBuilder {
            actions: Vec::new(),
        }
    }

    /// Adds an action that copies `src` to `target`.
    pub fn add_dup2(&mut self, src: Fd, target: Fd) -> &mut Self {
        self.actions.push(DupAction::Dup2 { src, target });
        self
    }

    /// Adds an action that closes `fd`.
    pub fn add_close(&mut self, fd: Fd) -> &mut Self {
        self.actions.push(DupAction::Close { fd });
        self
    }

    /// Freezes the actions into a plan.
    #[must_use]
    pub fn build(self) -> Plan {
        Plan {
            actions: self.actions.into_boxed_slice(),
        }
    }
}

/// Ordered list of [`DupAction`]s ready to be applied in a child process
///
/// A plan is made by [`Plan::resolve`] or [`PlanBuilder::build`]. There is no
/// `Default` implementation, so every plan goes through the check that the
/// process is not a forked child.
///
/// See the [module-level documentation](self) for details.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Plan {
    actions: Box<[DupAction]>,
}

impl Plan {
    /// Converts a chain into a plan.
    ///
    /// # Panics
    ///
    /// If the current process has been
    /// [marked as a forked child](crate::context::mark_forked_child).
    #[must_use]
    #[track_caller]
    pub fn resolve(chain: &IoChain) -> Plan {
        let mut builder = PlanBuilder::new();
        for entry in chain {
            match *entry {
                IoEntry::File { target, opened } => {
                    builder.add_dup2(opened, target);
                }
                IoEntry::Close { target } => {
                    builder.add_close(target);
                }
                IoEntry::FdDup { target, source } => {
                    builder.add_dup2(source, target);
                }
                IoEntry::Pipe { target, pipe_fd } => {
                    builder.add_dup2(pipe_fd, target).add_close(pipe_fd);
                }
                IoEntry::BufferFill { target, write_fd } => {
                    builder.add_dup2(write_fd, target).add_close(write_fd);
                }
            }
        }
        let plan = builder.build();
        tracing::debug!(
            entries = chain.len(),
            actions = plan.len(),
            "resolved I/O chain"
        );
        tracing::trace!(%plan);
        plan
    }

    /// Returns the actions in the order they are applied.
    #[inline]
    #[must_use]
    pub fn actions(&self) -> &[DupAction] {
        &self.actions
    }

    /// Returns the number of actions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the plan has no actions.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the file descriptor that `target` will refer to after the plan
    /// is applied.
    ///
    /// The result is the file descriptor that, before the plan is applied,
    /// refers to the open file description `target` will refer to after the
    /// plan is applied. If the plan leaves `target` closed, the result is
    /// [`Fd::CLOSED`]. If the plan does not touch `target`, the result is
    /// `target` itself. A negative `target` is returned intact.
    ///
    /// This function walks the actions backward, following `dup2` actions
    /// from their target to their source. This is not a full simulation:
    /// the result is only meaningful for plans that would succeed when
    /// applied. For example, in `[dup2(2, 1), dup2(1, 2)]` both 1 and 2
    /// resolve to 2, which matches what applying the plan does.
    ///
    /// This function does not allocate.
    #[must_use]
    pub fn resolve_target(&self, target: Fd) -> Fd {
        if target.is_negative() {
            return target;
        }

        let mut cursor = target;
        for action in self.actions.iter().rev() {
            match *action {
                DupAction::Dup2 { src, target } if target == cursor => cursor = src,
                DupAction::Close { fd } if fd == cursor => return Fd::CLOSED,
                _ => (),
            }
        }
        cursor
    }

    /// Performs the actions in order.
    ///
    /// This function stops at the first action that fails and returns the
    /// error. Actions that have been performed are not undone.
    ///
    /// This function does not allocate by itself, so it can be used in a
    /// forked child if `system` does not allocate either. Use
    /// [`apply_in_child`](Self::apply_in_child) to apply the plan to the
    /// current process.
    pub fn execute<S: FdSystem + ?Sized>(&self, system: &mut S) -> Result<(), ActionError> {
        for &action in self.actions.iter() {
            let result = match action {
                DupAction::Dup2 { src, target } => system.dup2(src, target).map(drop),
                DupAction::Close { fd } => system.close(fd),
            };
            result.map_err(|errno| ActionError { action, errno })?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[")?;
        for (i, action) in self.actions.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{action}")?;
        }
        f.write_str("]")
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a DupAction;
    type IntoIter = std::slice::Iter<'a, DupAction>;
    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
