//! Local terminal inspection and raw mode.

use ferry_common::termios::{self, PortableModes, TermiosError, WindowSize};
use nix::sys::termios::{cfmakeraw, SpecialCharacterIndices, Termios};
use std::os::fd::{BorrowedFd, RawFd};

/// Which standard streams are attached to a terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamTtys {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
}

impl StreamTtys {
    pub fn detect() -> Self {
        Self {
            stdin: atty::is(atty::Stream::Stdin),
            stdout: atty::is(atty::Stream::Stdout),
            stderr: atty::is(atty::Stream::Stderr),
        }
    }

    pub fn any(&self) -> bool {
        self.stdin || self.stdout || self.stderr
    }

    /// Raw mode only makes sense when both output streams are the terminal.
    pub fn wants_raw_mode(&self) -> bool {
        self.stdout && self.stderr
    }

    /// Highest-numbered terminal fd; it carries the geometry and modes.
    pub fn pty_fd(&self) -> Option<RawFd> {
        [
            (libc::STDERR_FILENO, self.stderr),
            (libc::STDOUT_FILENO, self.stdout),
            (libc::STDIN_FILENO, self.stdin),
        ]
        .into_iter()
        .find_map(|(fd, tty)| tty.then_some(fd))
    }
}

/// What the remote side needs to build a matching PTY.
#[derive(Debug, Clone)]
pub struct TerminalSnapshot {
    pub size: WindowSize,
    pub modes: PortableModes,
}

fn borrow_std_fd(fd: RawFd) -> BorrowedFd<'static> {
    // SAFETY: only called with 0, 1 or 2, which stay open for the whole
    // process lifetime.
    unsafe { BorrowedFd::borrow_raw(fd) }
}

pub fn capture(fd: RawFd) -> Result<TerminalSnapshot, TermiosError> {
    let borrowed = borrow_std_fd(fd);
    let size = termios::window_size(&borrowed)?;
    let attrs = termios::get_attributes(borrowed)?;
    Ok(TerminalSnapshot {
        size,
        modes: termios::to_portable(&attrs),
    })
}

pub fn current_size(fd: RawFd) -> Result<WindowSize, TermiosError> {
    termios::window_size(&borrow_std_fd(fd))
}

/// Puts the terminal in raw mode and restores the saved attributes on drop,
/// whichever way the session ends.
pub struct RawModeGuard {
    fd: RawFd,
    saved: Termios,
}

impl RawModeGuard {
    pub fn enter(fd: RawFd) -> Result<Self, TermiosError> {
        let saved = termios::get_attributes(borrow_std_fd(fd))?;
        let mut raw = saved.clone();
        cfmakeraw(&mut raw);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::set_attributes(borrow_std_fd(fd), &raw)?;
        tracing::debug!(fd, "terminal switched to raw mode");
        Ok(Self { fd, saved })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = termios::set_attributes(borrow_std_fd(self.fd), &self.saved) {
            tracing::warn!(error = %err, "failed to restore terminal attributes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pty_fd_prefers_highest_terminal() {
        let all = StreamTtys {
            stdin: true,
            stdout: true,
            stderr: true,
        };
        assert_eq!(all.pty_fd(), Some(2));
        assert!(all.wants_raw_mode());

        let input_only = StreamTtys {
            stdin: true,
            ..Default::default()
        };
        assert_eq!(input_only.pty_fd(), Some(0));
        assert!(!input_only.wants_raw_mode());

        let piped_err = StreamTtys {
            stdin: true,
            stdout: true,
            stderr: false,
        };
        assert_eq!(piped_err.pty_fd(), Some(1));
        assert!(!piped_err.wants_raw_mode());
    }

    #[test]
    fn no_terminal_means_no_pty() {
        let none = StreamTtys::default();
        assert!(!none.any());
        assert_eq!(none.pty_fd(), None);
    }
}
