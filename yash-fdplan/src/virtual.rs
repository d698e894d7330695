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

//! Virtual file descriptor table for testing
//!
//! [`VirtualFds`] simulates the file descriptor table of a process in
//! memory. Each open file descriptor maps to an [`FdBody`] holding a label
//! that stands for an open file description and the close-on-exec flag;
//! `dup2` copies the label, `close` removes the entry, and
//! [`exec`](VirtualFds::exec) drops every FD with the close-on-exec flag.
//! This is enough to check what a [`Plan`](crate::plan::Plan) does without
//! touching the real file descriptors of the test process.
//!
//! This module is available with the `test-helper` feature.

use crate::io::Fd;
use crate::plan::DupAction;
use crate::system::Errno;
use crate::system::FdSystem;
use std::collections::BTreeMap;

/// State of a file descriptor in [`VirtualFds`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FdBody {
    /// Label of the open file description
    pub label: String,
    /// Whether the FD is closed when the process executes a program
    pub cloexec: bool,
}

/// In-memory file descriptor table implementing [`FdSystem`]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VirtualFds {
    /// Open file descriptors
    pub fds: BTreeMap<Fd, FdBody>,
    /// Actions performed so far, including failed ones
    pub calls: Vec<DupAction>,
}

impl VirtualFds {
    /// Creates an empty file descriptor table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a file descriptor table with the standard input, output, and
    /// error open.
    ///
    /// The labels are `"stdin"`, `"stdout"`, and `"stderr"`, respectively.
    #[must_use]
    pub fn with_stdio() -> Self {
        let mut fds = Self::new();
        fds.open(Fd::STDIN, "stdin");
        fds.open(Fd::STDOUT, "stdout");
        fds.open(Fd::STDERR, "stderr");
        fds
    }

    /// Opens a file descriptor with the given label.
    ///
    /// If the file descriptor is already open, it is replaced.
    pub fn open<S: Into<String>>(&mut self, fd: Fd, label: S) {
        let label = label.into();
        self.fds.insert(fd, FdBody {
            label,
            cloexec: false,
        });
    }

    /// Opens a file descriptor with the close-on-exec flag, as `open` with
    /// `O_CLOEXEC` does.
    pub fn open_cloexec<S: Into<String>>(&mut self, fd: Fd, label: S) {
        let label = label.into();
        self.fds.insert(fd, FdBody {
            label,
            cloexec: true,
        });
    }

    /// Returns the label of the open file description the file descriptor
    /// refers to, or `None` if it is not open.
    #[must_use]
    pub fn get(&self, fd: Fd) -> Option<&str> {
        self.fds.get(&fd).map(|body| body.label.as_str())
    }

    /// Returns whether the file descriptor is open and has the
    /// close-on-exec flag.
    #[must_use]
    pub fn is_cloexec(&self, fd: Fd) -> bool {
        self.fds.get(&fd).is_some_and(|body| body.cloexec)
    }

    /// Simulates executing a program: closes all file descriptors that have
    /// the close-on-exec flag.
    pub fn exec(&mut self) {
        self.fds.retain(|_, body| !body.cloexec);
    }
}

impl FdSystem for VirtualFds {
    fn dup2(&mut self, from: Fd, to: Fd) -> Result<Fd, Errno> {
        self.calls.push(DupAction::Dup2 {
            src: from,
            target: to,
        });
        if to.is_negative() {
            return Err(Errno::EBADF);
        }
        let label = self.fds.get(&from).ok_or(Errno::EBADF)?.label.clone();
        self.fds.insert(to, FdBody {
            label,
            cloexec: false,
        });
        Ok(to)
    }

    fn close(&mut self, fd: Fd) -> Result<(), Errno> {
        self.calls.push(DupAction::Close { fd });
        self.fds.remove(&fd);
        Ok(())
    }
}
