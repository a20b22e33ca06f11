//! 零超时就绪探测与描述符标志位辅助函数。
//!
//! 所有函数借用描述符而不持有所有权，借用期间描述符保证有效。

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::libc;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use crate::error::{FCNTL, IOCTL, IoError, POLL};

/// 以零超时 `poll` 一次，返回内核报告的 `revents`。
pub fn poll_now(fd: BorrowedFd<'_>, events: PollFlags) -> Result<PollFlags, IoError> {
    let mut fds = [PollFd::new(fd, events)];
    loop {
        match poll(&mut fds, PollTimeout::ZERO) {
            Ok(_) => break,
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(IoError::new(POLL, io::Error::from(errno))),
        }
    }
    let revents = fds[0].revents().unwrap_or(PollFlags::empty());
    if revents.contains(PollFlags::POLLNVAL) {
        return Err(IoError::new(POLL, io::Error::from(Errno::EBADF)));
    }
    Ok(revents)
}

/// 通过 `FIONREAD` 读取接收队列中待读的字节数。
pub fn pending_bytes(fd: BorrowedFd<'_>) -> Result<usize, IoError> {
    let mut pending: libc::c_int = 0;
    // SAFETY: FIONREAD 只向 `pending` 写入一个 c_int，描述符由借用保证有效。
    let rc = unsafe {
        libc::ioctl(
            fd.as_raw_fd(),
            libc::FIONREAD,
            &mut pending as *mut libc::c_int,
        )
    };
    if rc < 0 {
        return Err(IoError::new(IOCTL, io::Error::from(Errno::last())));
    }
    Ok(usize::try_from(pending).unwrap_or(0))
}

/// 通用可读探测：先 `poll`，就绪后再尝试 `FIONREAD` 获取精确字节数。
///
/// 不支持 `FIONREAD` 的描述符（`ENOTTY`/`EINVAL`）在可读时报告 1；其余查询失败原样返回。
/// 已挂断的描述符报告 1，使调用方的下一次 `read` 能观测到 EOF。
pub fn readable_bytes(fd: BorrowedFd<'_>) -> Result<usize, IoError> {
    let ready = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
    if !poll_now(fd, PollFlags::POLLIN)?.intersects(ready) {
        return Ok(0);
    }
    match pending_bytes(fd) {
        Ok(0) => Ok(1),
        Ok(n) => Ok(n),
        Err(err) if matches!(err.errno(), Some(libc::ENOTTY | libc::EINVAL)) => Ok(1),
        Err(err) => Err(err),
    }
}

/// 通用可写探测：`POLLOUT` 置位时报告 1，否则为 0。
pub fn writable_bytes(fd: BorrowedFd<'_>) -> Result<usize, IoError> {
    let revents = poll_now(fd, PollFlags::POLLOUT)?;
    Ok(usize::from(revents.contains(PollFlags::POLLOUT)))
}

fn status_flags(fd: BorrowedFd<'_>) -> Result<OFlag, IoError> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL)
        .map(OFlag::from_bits_retain)
        .map_err(|errno| IoError::new(FCNTL, io::Error::from(errno)))
}

/// 读取描述符当前是否处于非阻塞模式。
pub fn is_nonblocking(fd: BorrowedFd<'_>) -> Result<bool, IoError> {
    Ok(status_flags(fd)?.contains(OFlag::O_NONBLOCK))
}

/// 切换 `O_NONBLOCK` 标志，其余状态标志保持不变。
pub fn set_nonblocking(fd: BorrowedFd<'_>, enabled: bool) -> Result<(), IoError> {
    let flags = status_flags(fd)?;
    let mut updated = flags;
    updated.set(OFlag::O_NONBLOCK, enabled);
    if updated == flags {
        return Ok(());
    }
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(updated))
        .map(drop)
        .map_err(|errno| IoError::new(FCNTL, io::Error::from(errno)))
}
