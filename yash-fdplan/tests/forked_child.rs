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

//! Marking the process as a forked child affects the whole test binary, so
//! this file contains only one test.

use std::panic::catch_unwind;
use yash_fdplan::Fd;
use yash_fdplan::Plan;
use yash_fdplan::chain::IoChain;
use yash_fdplan::chain::IoEntry;
use yash_fdplan::context::is_forked_child;
use yash_fdplan::context::mark_forked_child;
use yash_fdplan::plan::PlanBuilder;

#[test]
fn planning_in_forked_child_panics() {
    let mut chain = IoChain::new();
    chain.push(IoEntry::Pipe {
        target: Fd::STDIN,
        pipe_fd: Fd(3),
    });

    assert!(!is_forked_child());
    let plan = Plan::resolve(&chain);

    mark_forked_child();
    assert!(is_forked_child());

    let result = catch_unwind(|| Plan::resolve(&chain));
    assert!(result.is_err());
    let result = catch_unwind(PlanBuilder::new);
    assert!(result.is_err());

    // A plan built before forking can still be queried.
    assert_eq!(plan.resolve_target(Fd::STDIN), Fd(3));
    assert_eq!(plan.resolve_target(Fd(3)), Fd::CLOSED);
}
