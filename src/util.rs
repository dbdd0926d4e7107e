use nix::{
    fcntl::{fcntl, FcntlArg, OFlag},
    libc, Result,
};
use std::os::unix::prelude::RawFd;

/// Clears `O_NONBLOCK` on a descriptor that was opened non-blocking.
pub fn make_blocking(fd: RawFd) -> Result<()> {
    let opt = fcntl(fd, FcntlArg::F_GETFL)?;
    let mut opt = OFlag::from_bits_truncate(opt);
    opt.set(OFlag::O_NONBLOCK, false);
    fcntl(fd, FcntlArg::F_SETFL(opt))?;
    Ok(())
}

/// Number of bytes currently readable from `fd`.
///
/// A FIFO that polls readable with 0 bytes available has no connected
/// writer (either none arrived yet, or one opened and closed without
/// writing).
pub fn bytes_available(fd: RawFd) -> Result<usize> {
    nix::ioctl_read_bad!(_fionread, libc::FIONREAD, libc::c_int);

    let mut n: libc::c_int = 0;
    let _ = unsafe { _fionread(fd, &mut n) }?;

    Ok(n as usize)
}
