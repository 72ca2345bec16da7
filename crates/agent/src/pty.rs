//! Server-side pseudo-terminal allocation.

use crate::session::PtyRequest;
use anyhow::{Context, Result};
use ferry_common::termios::{self, WindowSize};
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::pty::{openpty, Winsize};
use std::fs::File;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};

pub struct PtyPair {
    pub master: File,
    pub slave: OwnedFd,
}

/// Open a PTY sized and configured like the client's terminal.
pub fn open(request: &PtyRequest) -> Result<PtyPair> {
    let winsize = Winsize {
        ws_row: request.size.rows,
        ws_col: request.size.cols,
        ws_xpixel: request.size.pixel_width,
        ws_ypixel: request.size.pixel_height,
    };
    let pair = openpty(Some(&winsize), None).context("openpty failed")?;
    for fd in [&pair.master, &pair.slave] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
            .context("failed to mark PTY close-on-exec")?;
    }

    if !request.modes.is_empty() {
        let mut attrs = termios::get_attributes(pair.slave.as_fd())?;
        termios::apply_portable(&request.modes, &mut attrs);
        termios::set_attributes(pair.slave.as_fd(), &attrs)?;
    }

    Ok(PtyPair {
        master: File::from(pair.master),
        slave: pair.slave,
    })
}

pub fn resize(master: &File, size: WindowSize) -> Result<()> {
    termios::set_window_size(master, size)?;
    Ok(())
}
