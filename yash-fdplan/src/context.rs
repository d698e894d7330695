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

//! Execution context of the current process
//!
//! After `fork`, the child process runs in a restricted context until it
//! calls `exec`. This module keeps track of whether the current process is in
//! that context so that code that must only run in the parent can fail
//! loudly when it is called in the child.
//!
//! The state is a single atomic flag, so both [`mark_forked_child`] and
//! [`is_forked_child`] are async-signal-safe.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;

static FORKED_CHILD: AtomicBool = AtomicBool::new(false);

/// Records that the current process is a forked child that has not yet
/// called `exec`.
///
/// This function should be called in the child process right after `fork`.
/// [`Plan::apply_in_child`](crate::plan::Plan::apply_in_child) calls it for
/// you. There is no way to unmark the process.
pub fn mark_forked_child() {
    FORKED_CHILD.store(true, Relaxed);
}

/// Whether [`mark_forked_child`] has been called in this process.
#[must_use]
pub fn is_forked_child() -> bool {
    FORKED_CHILD.load(Relaxed)
}

/// Panics if the current process is a forked child.
#[track_caller]
pub(crate) fn assert_not_forked_child() {
    assert!(
        !is_forked_child(),
        "file descriptor plans must be built before forking"
    );
}
