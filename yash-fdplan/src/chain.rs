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

//! I/O entries
//!
//! An [`IoChain`] is the ordered list of [`IoEntry`]s that should be
//! realized in a child process. Entries are already resolved: files have
//! been opened and pipes have been created by the time an entry is pushed
//! into a chain. The chain is the input to
//! [`Plan::resolve`](crate::plan::Plan::resolve).

use crate::directive::Directive;
use crate::directive::OFlag;
use crate::directive::RedirMode;
use crate::io::Fd;
use nix::errno::Errno;
use thiserror::Error;

/// Resolved I/O operation on a file descriptor
///
/// The file descriptors in `File`, `Pipe`, and `BufferFill` are owned by
/// whoever pushed the entry. In the plan, the descriptors of `Pipe` and
/// `BufferFill` are closed right after being copied to the target, while the
/// descriptor of `File` is expected to have the close-on-exec flag.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IoEntry {
    /// Redirection to a file that has been opened
    File {
        /// File descriptor to be modified
        target: Fd,
        /// File descriptor of the open file
        opened: Fd,
    },
    /// Closing a file descriptor
    Close {
        /// File descriptor to be closed
        target: Fd,
    },
    /// Copying a file descriptor
    FdDup {
        /// File descriptor to be modified
        target: Fd,
        /// File descriptor to copy from
        source: Fd,
    },
    /// Connection to an end of a pipe in a pipeline
    Pipe {
        /// File descriptor to be modified
        target: Fd,
        /// End of the pipe
        pipe_fd: Fd,
    },
    /// Connection to the writing end of a buffer that captures output
    /// (as in command substitution)
    BufferFill {
        /// File descriptor to be modified
        target: Fd,
        /// Writing end of the buffer
        write_fd: Fd,
    },
}

impl IoEntry {
    /// Returns the file descriptor modified by this entry.
    #[must_use]
    pub fn target(&self) -> Fd {
        match *self {
            IoEntry::File { target, .. }
            | IoEntry::Close { target }
            | IoEntry::FdDup { target, .. }
            | IoEntry::Pipe { target, .. }
            | IoEntry::BufferFill { target, .. } => target,
        }
    }
}

/// Error in converting a directive into an [`IoEntry`]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum EntryError {
    /// Operand of an fd redirection that is neither a file descriptor
    /// number nor `-`
    #[error("{0:?} is not a valid file descriptor")]
    BadFd(String),
    /// Error while opening a file
    #[error("cannot open file `{path}`: {errno}")]
    Open {
        /// Pathname of the file
        path: String,
        /// Error returned by the opener
        errno: Errno,
    },
}

/// Ordered list of [`IoEntry`]s
///
/// Later entries take precedence over earlier ones that modify the same file
/// descriptor, like redirections on a shell command line.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IoChain {
    entries: Vec<IoEntry>,
}

impl IoChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry to the end of the chain.
    pub fn push(&mut self, entry: IoEntry) {
        self.entries.push(entry);
    }

    /// Adds all the entries of another chain to the end of this chain.
    pub fn append(&mut self, other: &IoChain) {
        self.entries.extend_from_slice(&other.entries);
    }

    /// Returns the entries in order.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[IoEntry] {
        &self.entries
    }

    /// Returns an iterator over the entries.
    pub fn iter(&self) -> std::slice::Iter<'_, IoEntry> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the chain has no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the last entry that modifies the given file descriptor.
    #[must_use]
    pub fn io_for_fd(&self, fd: Fd) -> Option<&IoEntry> {
        self.entries.iter().rev().find(|entry| entry.target() == fd)
    }

    /// Converts directives into entries and adds them to the chain.
    ///
    /// Directives are processed in order:
    ///
    /// - An fd redirection whose target is `-` becomes [`IoEntry::Close`].
    /// - An fd redirection whose target is a file descriptor number becomes
    ///   [`IoEntry::FdDup`].
    /// - Any other fd redirection fails with [`EntryError::BadFd`].
    /// - A file redirection calls `open` with the pathname and the
    ///   [flags](Directive::open_flags) plus `O_CLOEXEC`, and becomes
    ///   [`IoEntry::File`] with the returned file descriptor. If `open`
    ///   fails, this function fails with [`EntryError::Open`].
    ///
    /// `open` may return the target FD itself. The resulting entry copies the
    /// FD onto itself, which clears its close-on-exec flag when the plan is
    /// applied, so the program still inherits the file.
    ///
    /// On failure, the entries converted so far remain in the chain. Files
    /// opened by `open` are owned by the caller in either case.
    pub fn append_from_directives<'a, I, F>(
        &mut self,
        directives: I,
        mut open: F,
    ) -> Result<(), EntryError>
    where
        I: IntoIterator<Item = &'a Directive>,
        F: FnMut(&str, OFlag) -> Result<Fd, Errno>,
    {
        for directive in directives {
            let target = directive.target_fd();
            let entry = match directive.mode() {
                RedirMode::Fd if directive.target() == "-" => IoEntry::Close { target },
                RedirMode::Fd => match directive.resolve_target_fd() {
                    Some(source) => IoEntry::FdDup { target, source },
                    None => return Err(EntryError::BadFd(directive.target().to_owned())),
                },
                _ => {
                    let path = directive.target();
                    let flags = directive.open_flags() | OFlag::O_CLOEXEC;
                    match open(path, flags) {
                        Ok(opened) => IoEntry::File { target, opened },
                        Err(errno) => {
                            tracing::debug!(path, %errno, "cannot open redirection target");
                            return Err(EntryError::Open {
                                path: path.to_owned(),
                                errno,
                            });
                        }
                    }
                }
            };
            self.entries.push(entry);
        }
        Ok(())
    }
}

impl FromIterator<IoEntry> for IoChain {
    fn from_iter<T: IntoIterator<Item = IoEntry>>(iter: T) -> Self {
        let entries = iter.into_iter().collect();
        IoChain { entries }
    }
}

impl Extend<IoEntry> for IoChain {
    fn extend<T: IntoIterator<Item = IoEntry>>(&mut self, iter: T) {
        self.entries.extend(iter)
    }
}

impl<'a> IntoIterator for &'a IoChain {
    type Item = &'a IoEntry;
    type IntoIter = std::slice::Iter<'a, IoEntry>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Plan;
    use crate::r#virtual::VirtualFds;
    use assert_matches::assert_matches;

    #[test]
    fn entry_target() {
        let target = Fd(3);
        let file = IoEntry::File {
            target,
            opened: Fd(10),
        };
        assert_eq!(file.target(), target);
        assert_eq!(IoEntry::Close { target }.target(), target);
        let fd_dup = IoEntry::FdDup {
            target,
            source: Fd(1),
        };
        assert_eq!(fd_dup.target(), target);
        let pipe = IoEntry::Pipe {
            target,
            pipe_fd: Fd(11),
        };
        assert_eq!(pipe.target(), target);
        let write_fd = Fd(12);
        assert_eq!(IoEntry::BufferFill { target, write_fd }.target(), target);
    }

    #[test]
    fn io_for_fd_returns_last_entry() {
        let chain: IoChain = [
            IoEntry::File {
                target: Fd::STDOUT,
                opened: Fd(10),
            },
            IoEntry::FdDup {
                target: Fd::STDERR,
                source: Fd::STDOUT,
            },
            IoEntry::Close { target: Fd::STDOUT },
        ]
        .into_iter()
        .collect();

        assert_eq!(
            chain.io_for_fd(Fd::STDOUT),
            Some(&IoEntry::Close { target: Fd::STDOUT })
        );
        assert_eq!(
            chain.io_for_fd(Fd::STDERR),
            Some(&IoEntry::FdDup {
                target: Fd::STDERR,
                source: Fd::STDOUT,
            })
        );
        assert_eq!(chain.io_for_fd(Fd::STDIN), None);
    }

    #[test]
    fn append_keeps_order() {
        let mut first = IoChain::new();
        first.push(IoEntry::Close { target: Fd(3) });
        let mut second = IoChain::new();
        second.push(IoEntry::Pipe {
            target: Fd::STDIN,
            pipe_fd: Fd(5),
        });
        first.append(&second);

        assert_eq!(
            first.entries(),
            [
                IoEntry::Close { target: Fd(3) },
                IoEntry::Pipe {
                    target: Fd::STDIN,
                    pipe_fd: Fd(5),
                },
            ]
        );
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn directives_to_entries() {
        let directives = [
            Directive::new(Fd::STDOUT, RedirMode::Overwrite, "out.txt"),
            Directive::new(Fd::STDERR, RedirMode::Fd, "1"),
            Directive::new(Fd::STDIN, RedirMode::Input, "in.txt"),
            Directive::new(Fd(3), RedirMode::Fd, "-"),
        ];
        let mut opened = Vec::new();
        let mut chain = IoChain::new();
        let result = chain.append_from_directives(&directives, |path, flags| {
            opened.push((path.to_owned(), flags));
            Ok(Fd(10 + opened.len() as i32))
        });

        assert_eq!(result, Ok(()));
        assert_eq!(
            chain.entries(),
            [
                IoEntry::File {
                    target: Fd::STDOUT,
                    opened: Fd(11),
                },
                IoEntry::FdDup {
                    target: Fd::STDERR,
                    source: Fd::STDOUT,
                },
                IoEntry::File {
                    target: Fd::STDIN,
                    opened: Fd(12),
                },
                IoEntry::Close { target: Fd(3) },
            ]
        );
        assert_eq!(
            opened,
            [
                (
                    "out.txt".to_owned(),
                    OFlag::O_CREAT | OFlag::O_WRONLY | OFlag::O_TRUNC | OFlag::O_CLOEXEC
                ),
                ("in.txt".to_owned(), OFlag::O_RDONLY | OFlag::O_CLOEXEC),
            ]
        );
    }

    #[test]
    fn file_opened_at_target_fd_is_inherited() {
        // The lowest free FD is 3, so the opener returns the target FD.
        let directives = [Directive::new(Fd(3), RedirMode::Overwrite, "log")];
        let mut fds = VirtualFds::with_stdio();
        let mut chain = IoChain::new();
        let result = chain.append_from_directives(&directives, |path, flags| {
            assert!(flags.contains(OFlag::O_CLOEXEC));
            fds.open_cloexec(Fd(3), path);
            Ok(Fd(3))
        });
        assert_eq!(result, Ok(()));
        assert_eq!(
            chain.entries(),
            [IoEntry::File {
                target: Fd(3),
                opened: Fd(3),
            }]
        );

        let plan = Plan::resolve(&chain);
        plan.execute(&mut fds).unwrap();
        fds.exec();
        assert_eq!(fds.get(Fd(3)), Some("log"));
    }

    #[test]
    fn directive_with_bad_fd() {
        let directives = [
            Directive::new(Fd(3), RedirMode::Fd, "-"),
            Directive::new(Fd::STDOUT, RedirMode::Fd, "foo"),
            Directive::new(Fd::STDERR, RedirMode::Fd, "1"),
        ];
        let mut chain = IoChain::new();
        let result = chain.append_from_directives(&directives, |_, _| unreachable!());

        assert_matches!(result, Err(EntryError::BadFd(value)) => assert_eq!(value, "foo"));
        assert_eq!(chain.entries(), [IoEntry::Close { target: Fd(3) }]);
    }

    #[test]
    fn directive_with_open_failure() {
        let directives = [Directive::new(Fd::STDOUT, RedirMode::NoClobber, "existing")];
        let mut chain = IoChain::new();
        let result = chain.append_from_directives(&directives, |_, _| Err(Errno::EEXIST));

        assert_matches!(result, Err(EntryError::Open { path, errno }) => {
            assert_eq!(path, "existing");
            assert_eq!(errno, Errno::EEXIST);
        });
        assert!(chain.is_empty());
    }
}
