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

//! [FdSystem] and its implementors.
//!
//! A [`Plan`](crate::plan::Plan) needs only two system calls: `dup2` and
//! `close`. The [`FdSystem`] trait abstracts them so that plans can be
//! executed against [`RealSystem`] in a child process and against a
//! [virtual](crate::r#virtual) file descriptor table in tests.

use crate::io::Fd;
use crate::plan::DupAction;
#[doc(no_inline)]
pub use nix::errno::Errno;
use thiserror::Error;

/// System calls needed to perform a plan
///
/// Implementations used in a forked child must not allocate memory or take
/// locks.
pub trait FdSystem {
    /// Duplicates a file descriptor.
    ///
    /// This is a thin wrapper around the `dup2` system call. If successful,
    /// returns `Ok(to)`. On error, returns `Err(_)`.
    ///
    /// The new FD does not have the close-on-exec flag. This also holds when
    /// `from` and `to` are the same FD, in which case the `dup2` system call
    /// would leave the flag unchanged, so implementations must clear the flag
    /// themselves.
    fn dup2(&mut self, from: Fd, to: Fd) -> Result<Fd, Errno>;

    /// Closes a file descriptor.
    ///
    /// This is a thin wrapper around the `close` system call.
    ///
    /// This function returns `Ok(())` when the FD is already closed.
    fn close(&mut self, fd: Fd) -> Result<(), Errno>;
}

/// Implementation of [`FdSystem`] that calls the underlying system
///
/// The implementation calls `libc` functions directly and never allocates,
/// so it is safe to use between `fork` and `exec`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RealSystem;

impl FdSystem for RealSystem {
    fn dup2(&mut self, from: Fd, to: Fd) -> Result<Fd, Errno> {
        if from == to {
            return clear_cloexec(to).map(|()| to);
        }
        loop {
            let result = unsafe { libc::dup2(from.0, to.0) };
            match Errno::result(result) {
                Ok(fd) => return Ok(Fd(fd)),
                Err(Errno::EINTR) => (),
                Err(errno) => return Err(errno),
            }
        }
    }

    fn close(&mut self, fd: Fd) -> Result<(), Errno> {
        let result = unsafe { libc::close(fd.0) };
        match Errno::result(result) {
            Ok(_) | Err(Errno::EBADF) => Ok(()),
            // Linux releases the FD even if interrupted, so retrying
            // might close an FD reopened by someone else.
            Err(Errno::EINTR) => Ok(()),
            Err(errno) => Err(errno),
        }
    }
}

/// Clears the close-on-exec flag of the FD.
///
/// Fails with `EBADF` if the FD is not open.
fn clear_cloexec(fd: Fd) -> Result<(), Errno> {
    let flags = Errno::result(unsafe { libc::fcntl(fd.0, libc::F_GETFD) })?;
    if flags & libc::FD_CLOEXEC != 0 {
        let flags = flags & !libc::FD_CLOEXEC;
        Errno::result(unsafe { libc::fcntl(fd.0, libc::F_SETFD, flags) })?;
    }
    Ok(())
}

/// Error in performing an action of a plan
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("cannot perform {action}: {errno}")]
pub struct ActionError {
    /// Action that failed
    pub action: DupAction,
    /// Error returned by the system
    pub errno: Errno,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd as _;

    fn has_cloexec(fd: Fd) -> bool {
        let flags = unsafe { libc::fcntl(fd.0, libc::F_GETFD) };
        assert_ne!(flags, -1);
        flags & libc::FD_CLOEXEC != 0
    }

    #[test]
    fn dup2_onto_itself_clears_cloexec() {
        let file = tempfile::tempfile().unwrap();
        let fd = Fd(file.as_raw_fd());
        assert!(has_cloexec(fd));

        assert_eq!(RealSystem.dup2(fd, fd), Ok(fd));
        assert!(!has_cloexec(fd));
    }

    #[test]
    fn action_error_display() {
        let error = ActionError {
            action: DupAction::Dup2 {
                src: Fd(9),
                target: Fd::STDOUT,
            },
            errno: Errno::EBADF,
        };
        let message = error.to_string();
        assert!(
            message.starts_with("cannot perform dup2(9, 1): "),
            "{message}"
        );
    }
}
