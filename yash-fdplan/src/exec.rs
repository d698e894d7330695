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

//! Applying plans in child processes
//!
//! Between `fork` and `exec`, the child process cannot return an error to
//! the parent. If an action of a plan fails there,
//! [`Plan::apply_in_child`] prints a short message to the standard error and
//! terminates the child with [`EXIT_STATUS_SETUP_FAILED`], so the parent sees
//! the failure as the exit status of the child.

use crate::context::mark_forked_child;
use crate::io::Fd;
use crate::plan::Plan;
use crate::system::ActionError;
use crate::system::RealSystem;
use std::fmt::Write as _;
use std::os::unix::process::CommandExt as UnixCommandExt;
use std::process::Command;

/// Exit status of a child process that failed to apply its plan
pub const EXIT_STATUS_SETUP_FAILED: i32 = 125;

/// Fixed-size buffer for formatting a message without allocation
struct MessageBuffer {
    bytes: [u8; 128],
    len: usize,
}

impl MessageBuffer {
    fn new() -> Self {
        MessageBuffer {
            bytes: [0; 128],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Appends as much of the string as fits, silently truncating the rest.
impl std::fmt::Write for MessageBuffer {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        let room = self.bytes.len() - self.len;
        let n = s.len().min(room);
        self.bytes[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

/// Prints the error to the standard error without allocating.
///
/// The standard error may itself have been redirected or closed by the plan,
/// so the message may go anywhere or nowhere.
fn report(error: &ActionError) {
    let mut message = MessageBuffer::new();
    let _ = writeln!(message, "yash: {error}");
    let bytes = message.as_bytes();
    unsafe {
        libc::write(Fd::STDERR.0, bytes.as_ptr().cast(), bytes.len());
    }
}

impl Plan {
    /// Applies the plan to the current process.
    ///
    /// This function must be called in a child process after `fork` and
    /// before `exec`. It [marks the process as a forked
    /// child](crate::context::mark_forked_child) and performs the actions
    /// with [`RealSystem`].
    ///
    /// If an action fails, this function prints an error message to the
    /// standard error and exits the process immediately with
    /// [`EXIT_STATUS_SETUP_FAILED`], without running any destructors or exit
    /// handlers.
    ///
    /// This function does not allocate memory.
    pub fn apply_in_child(&self) {
        mark_forked_child();
        if let Err(error) = self.execute(&mut RealSystem) {
            report(&error);
            unsafe { libc::_exit(EXIT_STATUS_SETUP_FAILED) }
        }
    }
}

/// Extension of [`Command`] for applying a plan in the child process
pub trait CommandExt {
    /// Schedules the plan to be applied in the child process before the
    /// program is executed.
    ///
    /// The plan is applied with [`Plan::apply_in_child`] after the standard
    /// input, output, and error of the command have been set up, so the plan
    /// overrides them. If the plan fails, the command exits with
    /// [`EXIT_STATUS_SETUP_FAILED`] instead of running the program.
    ///
    /// File descriptors named in the plan must stay open in the parent until
    /// the command has been spawned.
    fn fd_plan(&mut self, plan: Plan) -> &mut Self;
}

impl CommandExt for Command {
    fn fd_plan(&mut self, plan: Plan) -> &mut Self {
        // SAFETY: `apply_in_child` calls only `dup2`, `fcntl`, `close`,
        // `write`, and `_exit`, all of which are async-signal-safe.
        unsafe {
            self.pre_exec(move || {
                plan.apply_in_child();
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::DupAction;
    use crate::system::Errno;
    use std::fmt::Write as _;

    #[test]
    fn message_buffer_formats_error() {
        let error = ActionError {
            action: DupAction::Close { fd: Fd(4) },
            errno: Errno::EIO,
        };
        let mut message = MessageBuffer::new();
        writeln!(message, "yash: {error}").unwrap();
        let message = std::str::from_utf8(message.as_bytes()).unwrap();
        assert!(
            message.starts_with("yash: cannot perform close(4): "),
            "{message}"
        );
        assert!(message.ends_with('\n'), "{message}");
    }

    #[test]
    fn message_buffer_truncates() {
        let mut message = MessageBuffer::new();
        for _ in 0..20 {
            message.write_str("0123456789").unwrap();
        }
        assert_eq!(message.as_bytes().len(), 128);
        assert_eq!(&message.as_bytes()[120..], b"01234567");
    }
}
