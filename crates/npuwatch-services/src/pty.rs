//! Pseudo-terminal for the watch command.
//!
//! Tools built on stdio only line-buffer when stdout is a terminal, so the
//! command writes to the slave side and the monitor reads the master side.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::Stdio;

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::pty::{openpty, Winsize};
use nix::sys::termios::Termios;

// Wide enough that npu-smi never wraps a row.
const COLUMNS: u16 = 512;
const ROWS: u16 = 50;

pub(crate) struct Pty {
    pub master: tokio::fs::File,
    pub slave: Stdio,
}

pub(crate) fn open() -> io::Result<Pty> {
    let winsize = Winsize {
        ws_row: ROWS,
        ws_col: COLUMNS,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let pair = openpty(Some(&winsize), None::<&Termios>)?;

    // Keep other children from inheriting either end, or the master never sees EOF.
    set_cloexec(&pair.master)?;
    set_cloexec(&pair.slave)?;

    Ok(Pty {
        master: tokio::fs::File::from_std(File::from(pair.master)),
        slave: Stdio::from(pair.slave),
    })
}

/// Linux reports a hung-up pty master as EIO rather than EOF.
pub(crate) fn is_hangup(e: &io::Error) -> bool {
    e.raw_os_error() == Some(Errno::EIO as i32)
}

fn set_cloexec(fd: &OwnedFd) -> io::Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    Ok(())
}
