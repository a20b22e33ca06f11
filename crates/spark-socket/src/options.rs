//! 套接字选项与内核队列查询。
//!
//! 每个函数只做一次系统调用并映射为对应操作码的 [`SocketError`]，调用顺序由
//! [`crate::socket`] 中的建立流程决定。

use std::io;
use std::net::Ipv4Addr;
use std::os::fd::AsRawFd;

use nix::errno::Errno;
use nix::libc;
use nix::sys::socket::{setsockopt, sockopt};
use socket2::Socket;
use tracing::debug;

use crate::error::{GETSOCKOPT, IOCTL, SETSOCKOPT, SocketError};

/// 把套接字绑定到指定网卡（`SO_BINDTODEVICE`）。
pub(crate) fn bind_device(socket: &Socket, device: &str) -> Result<(), SocketError> {
    socket
        .bind_device(Some(device.as_bytes()))
        .map_err(|err| SocketError::os(SETSOCKOPT, err))?;
    debug!(fd = socket.as_raw_fd(), device, "socket bound to device");
    Ok(())
}

pub(crate) fn reuse_address(socket: &Socket) -> Result<(), SocketError> {
    socket
        .set_reuse_address(true)
        .map_err(|err| SocketError::os(SETSOCKOPT, err))
}

/// 在任意接口上加入组播组。
pub(crate) fn join_multicast(socket: &Socket, group: Ipv4Addr) -> Result<(), SocketError> {
    socket
        .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
        .map_err(|err| SocketError::os(SETSOCKOPT, err))?;
    debug!(fd = socket.as_raw_fd(), %group, "joined multicast group");
    Ok(())
}

pub(crate) fn set_multicast_ttl(socket: &Socket, ttl: u32) -> Result<(), SocketError> {
    socket
        .set_multicast_ttl_v4(ttl)
        .map_err(|err| SocketError::os(SETSOCKOPT, err))
}

/// 读取内核发送缓冲区大小（`SO_SNDBUF`）。
pub(crate) fn send_buffer_size(socket: &Socket) -> Result<usize, SocketError> {
    socket
        .send_buffer_size()
        .map_err(|err| SocketError::os(GETSOCKOPT, err))
}

/// 切换 `TCP_NODELAY`。
pub(crate) fn set_no_delay(socket: &Socket, enabled: bool) -> Result<(), SocketError> {
    setsockopt(socket, sockopt::TcpNoDelay, &enabled)
        .map_err(|errno| SocketError::os(SETSOCKOPT, io::Error::from(errno)))
}

/// 发送队列中尚未被对端确认的字节数（`TIOCOUTQ`）。
pub(crate) fn output_queue_len(socket: &Socket) -> Result<usize, SocketError> {
    let mut queued: libc::c_int = 0;
    // SAFETY: TIOCOUTQ 只向 `queued` 写入一个 c_int，描述符由 `socket` 借用保证有效。
    let rc = unsafe {
        libc::ioctl(
            socket.as_raw_fd(),
            libc::TIOCOUTQ,
            &mut queued as *mut libc::c_int,
        )
    };
    if rc < 0 {
        return Err(SocketError::os(IOCTL, io::Error::from(Errno::last())));
    }
    Ok(usize::try_from(queued).unwrap_or(0))
}
