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

//! Redirection directives
//!
//! A [`Directive`] is the user-level description of one redirection as it
//! comes out of the parser: the file descriptor to modify, the
//! [mode](RedirMode) of the redirection, and the target text, which is a
//! pathname or a file descriptor number depending on the mode.
//!
//! Directives are turned into [I/O entries](crate::chain::IoEntry) before
//! being planned. Use [`open_flags`](Directive::open_flags) to open the file
//! for a file redirection and [`resolve_target_fd`](Directive::resolve_target_fd)
//! to find the file descriptor to copy for an fd redirection.

use crate::io::Fd;
#[doc(no_inline)]
pub use nix::fcntl::OFlag;
use std::os::unix::io::RawFd;

/// Mode of a redirection
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RedirMode {
    /// `>>` (open a file for output; append if existing)
    Append,
    /// `>` (open a file for output; truncate if existing)
    Overwrite,
    /// `>?` (open a file for output; fail if existing)
    NoClobber,
    /// `<` (open a file for input)
    Input,
    /// `>&` or `<&` (copy or close a file descriptor)
    Fd,
}

impl RedirMode {
    /// Whether this mode opens a file.
    ///
    /// Returns true for all modes but [`Fd`](Self::Fd).
    #[must_use]
    pub const fn is_file(self) -> bool {
        !matches!(self, RedirMode::Fd)
    }
}

/// Redirection directive
///
/// A directive is immutable once constructed.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Directive {
    target_fd: Fd,
    mode: RedirMode,
    target: String,
}

impl Directive {
    /// Creates a new directive.
    ///
    /// `target_fd` is the file descriptor modified by the redirection.
    /// `target` is the operand of the redirection: a pathname for file modes
    /// or a file descriptor number (or `-`) for [`RedirMode::Fd`].
    ///
    /// # Panics
    ///
    /// If `target_fd` is negative.
    #[must_use]
    #[track_caller]
    pub fn new<S: Into<String>>(target_fd: Fd, mode: RedirMode, target: S) -> Self {
        assert!(
            !target_fd.is_negative(),
            "negative file descriptor for redirection: {target_fd}"
        );
        let target = target.into();
        Directive {
            target_fd,
            mode,
            target,
        }
    }

    /// Returns the file descriptor modified by this redirection.
    #[inline]
    #[must_use]
    pub fn target_fd(&self) -> Fd {
        self.target_fd
    }

    /// Returns the mode of this redirection.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> RedirMode {
        self.mode
    }

    /// Returns the operand of this redirection.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Parses the target as a file descriptor number.
    ///
    /// Returns `None` if the target is not a non-negative decimal integer
    /// that fits in a file descriptor. Surrounding whitespace is ignored.
    ///
    /// This function is meaningful for [`RedirMode::Fd`] only, but it does
    /// not check the mode.
    #[must_use]
    pub fn resolve_target_fd(&self) -> Option<Fd> {
        let raw = self
            .target
            .trim_matches(|c: char| c.is_ascii_whitespace())
            .parse::<RawFd>()
            .ok()?;
        (raw >= 0).then_some(Fd(raw))
    }

    /// Returns the flags to open the file for this redirection.
    ///
    /// | Mode | Flags |
    /// |------|-------|
    /// | [`Append`](RedirMode::Append) | `O_CREAT \| O_APPEND \| O_WRONLY` |
    /// | [`Overwrite`](RedirMode::Overwrite) | `O_CREAT \| O_WRONLY \| O_TRUNC` |
    /// | [`NoClobber`](RedirMode::NoClobber) | `O_CREAT \| O_EXCL \| O_WRONLY` |
    /// | [`Input`](RedirMode::Input) | `O_RDONLY` |
    ///
    /// # Panics
    ///
    /// If the mode is [`RedirMode::Fd`]. An fd redirection does not open a
    /// file and must have been converted into an
    /// [`FdDup`](crate::chain::IoEntry::FdDup) or
    /// [`Close`](crate::chain::IoEntry::Close) entry instead.
    #[must_use]
    #[track_caller]
    pub fn open_flags(&self) -> OFlag {
        match self.mode {
            RedirMode::Append => OFlag::O_CREAT | OFlag::O_APPEND | OFlag::O_WRONLY,
            RedirMode::Overwrite => OFlag::O_CREAT | OFlag::O_WRONLY | OFlag::O_TRUNC,
            RedirMode::NoClobber => OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_WRONLY,
            RedirMode::Input => OFlag::O_RDONLY,
            RedirMode::Fd => panic!("not a file redirection: {self:?}"),
        }
    }
}
