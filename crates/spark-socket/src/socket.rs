//! 套接字端点：UDP、TCP 客户端/服务端与组播。
//!
//! # 教案式说明
//! - **意图（Why）**：按地址解析出的套接字类型执行对应建立流程，之后以统一的 [`ByteStream`]
//!   能力对外服务；TCP 额外提供零拷贝的管道到套接字传输。
//! - **逻辑（How）**：套接字由 `socket2` 创建并立即移交给 [`FdStream`] 持有；后续所有调用都通过
//!   `SockRef` 临时借用描述符，不会产生第二个所有者。
//! - **契约（What）**：非阻塞模式下的“暂无数据/暂无空间”返回 `Ok(0)`；其余失败一律为
//!   [`SocketError`]，携带原始 errno。

use std::io::{self, Read};
use std::net::SocketAddrV4;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{SpliceFFlags, splice};
use nix::libc;
use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};
use spark_stream::{ByteStream, FdStream, OperationKind, drive_io, poll};
use tracing::debug;
use tracing::warn;

use crate::addr::{EndpointAddress, SocketKind};
use crate::error::{
    ACCEPT, BIND, CONNECT, CREATE, FCNTL, GETSOCKOPT, IOCTL, LISTEN, READ, SETSOCKOPT, SPLICE,
    SocketError, WRITE,
};
use crate::options;

/// TCP 服务端的监听队列长度。
const LISTEN_BACKLOG: i32 = 2;

/// TCP 发送默认携带的标志：合并小段等待显式 flush，并以 `EPIPE` 代替 `SIGPIPE`。
const TCP_SEND_FLAGS: libc::c_int = libc::MSG_MORE | libc::MSG_NOSIGNAL;

/// UDP 发送不附加任何标志。
const UDP_SEND_FLAGS: libc::c_int = 0;

/// 套接字端点。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 以一个 URL 加一个可选网卡名描述并建立任意 IPv4 传输端点；
/// - 服务端接受的连接成为全新的独立端点，与监听端点只共享描述性地址。
///
/// ## 体系定位（Architecture）
/// - 底层描述符由 [`FdStream`] 持有，本类型只附加地址、发送缓冲区大小、非阻塞标记、
///   默认发送标志与网卡名等元数据；
/// - 建立流程中的每一步都以 `debug!` 记录，便于排查权限或地址占用问题。
///
/// ## 契约（What）
/// - `open`：按类型建立套接字，任一系统调用失败即返回 [`SocketError`]；
/// - `accept_client`：只对 TCP 服务端有意义，其它类型由内核 `accept` 报错；
/// - `splice_write`：仅限 TCP，UDP 返回 [`SocketError::Unsupported`]；
/// - `can_write`：缓存的发送缓冲区大小减去内核输出队列占用，下限为 0。
///
/// ## 风险提示（Trade-offs）
/// - TCP 默认带 `MSG_MORE`，小块写入可能滞留在内核中，需调用 [`SocketEndpoint::flush`] 推送；
/// - Linux 报告的 `SO_SNDBUF` 为设置值的两倍，`can_write` 因此偏乐观，只适合作为流控参考。
#[derive(Debug)]
pub struct SocketEndpoint {
    stream: FdStream,
    address: EndpointAddress,
    send_buffer_size: usize,
    nonblocking: bool,
    send_flags: libc::c_int,
    device: Option<String>,
}

impl SocketEndpoint {
    /// 按 `address` 的套接字类型建立端点，`bind_device` 非空时先绑定到该网卡。
    pub fn open(address: EndpointAddress, bind_device: Option<&str>) -> Result<Self, SocketError> {
        let device = bind_device.filter(|name| !name.is_empty());
        let kind = address.socket_kind();
        debug!(url = address.url(), %kind, device, "opening socket endpoint");

        let (socket, send_flags) = match kind {
            SocketKind::Udp | SocketKind::UdpReceive => {
                let socket = create(Type::DGRAM, Protocol::UDP)?;
                if let Some(device) = device {
                    options::bind_device(&socket, device)?;
                }
                options::reuse_address(&socket)?;
                bind(&socket, &address)?;
                if address.is_multicast() {
                    options::join_multicast(&socket, address.ipv4())?;
                }
                (socket, UDP_SEND_FLAGS)
            }
            SocketKind::UdpSend => {
                let socket = create(Type::DGRAM, Protocol::UDP)?;
                if let Some(device) = device {
                    options::bind_device(&socket, device)?;
                }
                options::reuse_address(&socket)?;
                (socket, UDP_SEND_FLAGS)
            }
            SocketKind::TcpClient => {
                let socket = create(Type::STREAM, Protocol::TCP)?;
                if let Some(device) = device {
                    options::bind_device(&socket, device)?;
                }
                socket
                    .connect(&SockAddr::from(address.socket_addr()))
                    .map_err(|err| SocketError::os(CONNECT, err))?;
                debug!(fd = socket.as_raw_fd(), url = address.url(), "connected");
                (socket, TCP_SEND_FLAGS)
            }
            SocketKind::TcpServer => {
                let socket = create(Type::STREAM, Protocol::TCP)?;
                if let Some(device) = device {
                    options::bind_device(&socket, device)?;
                }
                bind(&socket, &address)?;
                socket
                    .listen(LISTEN_BACKLOG)
                    .map_err(|err| SocketError::os(LISTEN, err))?;
                debug!(fd = socket.as_raw_fd(), backlog = LISTEN_BACKLOG, "listening");
                (socket, TCP_SEND_FLAGS)
            }
            other => return Err(SocketError::UnknownKind(other)),
        };

        Self::from_parts(
            OwnedFd::from(socket),
            address,
            send_flags,
            device.map(str::to_owned),
        )
    }

    /// 接受一个入站连接，返回类型固定为 TCP 客户端的新端点。
    ///
    /// 监听端点处于阻塞模式时等待对端连入；非阻塞且无待接受连接时返回
    /// `WouldBlock` 类别的 [`SocketError`]。
    pub fn accept_client(&self) -> Result<SocketEndpoint, SocketError> {
        let socket = self.socket(ACCEPT)?;
        let (peer, peer_addr) = loop {
            match socket.accept() {
                Ok(accepted) => break accepted,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(
                        url = self.address.url(),
                        kind = %self.address.socket_kind(),
                        errno = err.raw_os_error(),
                        "accept failed"
                    );
                    return Err(SocketError::os(ACCEPT, err));
                }
            }
        };
        debug!(
            fd = peer.as_raw_fd(),
            peer = ?peer_addr.as_socket(),
            "accepted client"
        );
        Self::from_parts(
            OwnedFd::from(peer),
            self.address.with_kind(SocketKind::TcpClient),
            TCP_SEND_FLAGS,
            self.device.clone(),
        )
    }

    fn from_parts(
        fd: OwnedFd,
        address: EndpointAddress,
        send_flags: libc::c_int,
        device: Option<String>,
    ) -> Result<Self, SocketError> {
        let stream = FdStream::from(fd);
        let send_buffer_size = match stream.handle().fd() {
            Some(fd) => options::send_buffer_size(&SockRef::from(fd))?,
            None => return Err(SocketError::os(GETSOCKOPT, ebadf())),
        };
        debug!(fd = stream.raw_fd(), send_buffer_size, "socket endpoint ready");
        Ok(Self {
            stream,
            address,
            send_buffer_size,
            nonblocking: false,
            send_flags,
            device,
        })
    }

    /// 把管道读端中的至多 `len` 字节经内核直接搬运到套接字发送缓冲区。
    ///
    /// 返回实际搬运的字节数；非阻塞端点在无法立即搬运时返回 `Ok(0)`，
    /// 管道写端已关闭且无剩余数据时同样返回 `Ok(0)`。
    pub fn splice_write<S>(&mut self, source: &S, len: usize) -> Result<usize, SocketError>
    where
        S: AsRawFd + ?Sized,
    {
        if !self.address.socket_kind().is_tcp() {
            return Err(SocketError::Unsupported("splice is unsupported for UDP"));
        }
        let mut flags = SpliceFFlags::SPLICE_F_MORE;
        if self.nonblocking {
            flags |= SpliceFFlags::SPLICE_F_NONBLOCK;
        }
        let input = source.as_raw_fd();
        let output = self.socket(SPLICE)?.as_raw_fd();
        drive_io(|| splice(input, None, output, None, len, flags).map_err(io::Error::from))
            .map_err(|err| SocketError::os(SPLICE, err))
    }

    /// 切换到非阻塞模式：先读取描述符标志，再置位 `O_NONBLOCK`。
    pub fn set_nonblocking(&mut self) -> Result<(), SocketError> {
        self.stream
            .set_nonblocking(true)
            .map_err(|err| SocketError::from_stream(FCNTL, err))?;
        self.nonblocking = true;
        debug!(fd = self.stream.raw_fd(), "socket switched to nonblocking");
        Ok(())
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    /// 设置组播报文的跳数限制。
    pub fn set_multicast_ttl(&self, ttl: u32) -> Result<(), SocketError> {
        let kind = self.address.socket_kind();
        if !kind.is_udp() {
            warn!(url = self.address.url(), %kind, ttl, "multicast ttl set on non-UDP endpoint");
        }
        let socket = self.socket(SETSOCKOPT)?;
        options::set_multicast_ttl(&socket, ttl)
    }

    /// 推送因 `MSG_MORE` 滞留在内核中的数据；对非 TCP 客户端为空操作。
    pub fn flush(&self) -> Result<(), SocketError> {
        if self.address.socket_kind() != SocketKind::TcpClient {
            return Ok(());
        }
        let socket = self.socket(SETSOCKOPT)?;
        options::set_no_delay(&socket, true)?;
        options::set_no_delay(&socket, false)
    }

    /// 内核实际绑定的本地地址，监听 `:0` 时用于取回分配的端口。
    pub fn local_addr(&self) -> Result<SocketAddrV4, SocketError> {
        let local = self
            .socket(GETSOCKOPT)?
            .local_addr()
            .map_err(|err| SocketError::os(GETSOCKOPT, err))?;
        local
            .as_socket_ipv4()
            .ok_or_else(|| SocketError::os(GETSOCKOPT, io::Error::from(Errno::EAFNOSUPPORT)))
    }

    /// 关闭底层描述符，此后所有操作返回 `EBADF`。
    pub fn close(&mut self) {
        debug!(fd = self.stream.raw_fd(), url = self.address.url(), "closing socket endpoint");
        self.stream.close();
    }

    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    pub fn socket_kind(&self) -> SocketKind {
        self.address.socket_kind()
    }

    pub fn raw_fd(&self) -> RawFd {
        self.stream.raw_fd()
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// 建立时缓存的内核发送缓冲区大小。
    pub fn send_buffer_size(&self) -> usize {
        self.send_buffer_size
    }

    pub fn default_send_flags(&self) -> libc::c_int {
        self.send_flags
    }

    fn socket(&self, op: OperationKind) -> Result<SockRef<'_>, SocketError> {
        self.stream
            .handle()
            .fd()
            .map(SockRef::from)
            .ok_or_else(|| SocketError::os(op, ebadf()))
    }
}

impl AsRawFd for SocketEndpoint {
    fn as_raw_fd(&self) -> RawFd {
        self.raw_fd()
    }
}

impl ByteStream for SocketEndpoint {
    type Error = SocketError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SocketError> {
        let socket = self.socket(READ)?;
        drive_io(|| Read::read(&mut &*socket, buf)).map_err(|err| SocketError::os(READ, err))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, SocketError> {
        let socket = self.socket(WRITE)?;
        let flags = self.send_flags;
        let result = if self.address.socket_kind().is_tcp() {
            drive_io(|| socket.send_with_flags(buf, flags))
        } else {
            let target = SockAddr::from(self.address.socket_addr());
            drive_io(|| socket.send_to_with_flags(buf, &target, flags))
        };
        result.map_err(|err| SocketError::os(WRITE, err))
    }

    fn can_read(&self) -> Result<usize, SocketError> {
        let socket = self.socket(IOCTL)?;
        poll::pending_bytes(socket.as_fd()).map_err(|err| SocketError::from_stream(IOCTL, err))
    }

    fn can_write(&self) -> Result<usize, SocketError> {
        let socket = self.socket(IOCTL)?;
        let queued = options::output_queue_len(&socket)?;
        Ok(self.send_buffer_size.saturating_sub(queued))
    }
}

fn create(ty: Type, protocol: Protocol) -> Result<Socket, SocketError> {
    let socket =
        Socket::new(Domain::IPV4, ty, Some(protocol)).map_err(|err| SocketError::os(CREATE, err))?;
    debug!(fd = socket.as_raw_fd(), ?ty, "socket created");
    Ok(socket)
}

fn bind(socket: &Socket, address: &EndpointAddress) -> Result<(), SocketError> {
    socket
        .bind(&SockAddr::from(address.socket_addr()))
        .map_err(|err| SocketError::os(BIND, err))?;
    debug!(fd = socket.as_raw_fd(), addr = %address.socket_addr(), "socket bound");
    Ok(())
}

fn ebadf() -> io::Error {
    io::Error::from(Errno::EBADF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn open(url: &str, kind: SocketKind) -> SocketEndpoint {
        let address = EndpointAddress::parse(url, kind).expect("valid url");
        SocketEndpoint::open(address, None).expect("open endpoint")
    }

    #[test]
    fn unsupported_kinds_are_rejected() {
        for kind in [SocketKind::Unknown, SocketKind::Raw, SocketKind::Sctp] {
            let address = EndpointAddress::parse("ftp://127.0.0.1", kind).expect("valid url");
            let err = SocketEndpoint::open(address, None).expect_err("unsupported kind");
            assert!(matches!(err, SocketError::UnknownKind(k) if k == kind));
        }
    }

    #[test]
    fn send_flags_follow_transport() {
        let server = open("tcp://127.0.0.1:0", SocketKind::TcpServer);
        assert_eq!(server.default_send_flags(), TCP_SEND_FLAGS);
        let sender = open("udp://127.0.0.1:9", SocketKind::UdpSend);
        assert_eq!(sender.default_send_flags(), UDP_SEND_FLAGS);
        assert!(sender.send_buffer_size() > 0);
        assert!(sender.can_write().expect("headroom") > 0);
    }

    #[test]
    fn splice_on_udp_is_unsupported() {
        let mut sender = open("udp://127.0.0.1:9", SocketKind::UdpSend);
        let (reader, _writer) = FdStream::pipe().expect("pipe");
        let err = sender.splice_write(&reader, 16).expect_err("udp splice");
        assert!(matches!(err, SocketError::Unsupported(_)));
        assert_eq!(err.to_string(), "splice is unsupported for UDP");
    }

    #[test]
    fn closed_endpoint_reports_ebadf() {
        let mut sender = open("udp://127.0.0.1:9", SocketKind::UdpSend);
        sender.close();
        let err = sender.write(b"x").expect_err("closed");
        assert_eq!(err.errno(), Some(libc::EBADF));
        assert_eq!(err.code(), "spark.socket.write_failed");
        assert_eq!(sender.can_read().expect_err("closed").errno(), Some(libc::EBADF));
    }

    #[test]
    fn nonblocking_accept_without_peer_would_block() {
        let mut server = open("tcp://127.0.0.1:0", SocketKind::TcpServer);
        server.set_nonblocking().expect("nonblocking");
        assert!(server.is_nonblocking());
        let err = server.accept_client().expect_err("no pending peer");
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(err.code(), "spark.socket.accept_failed");
    }

    #[test]
    #[traced_test]
    fn ttl_on_tcp_endpoint_warns() {
        let server = open("tcp://127.0.0.1:0", SocketKind::TcpServer);
        // 内核是否接受由协议族决定，这里只断言告警。
        let _ = server.set_multicast_ttl(3);
        assert!(logs_contain("multicast ttl set on non-UDP endpoint"));
    }

    #[test]
    fn flush_is_noop_for_udp() {
        let sender = open("udp://127.0.0.1:9", SocketKind::UdpSend);
        sender.flush().expect("noop flush");
    }
}
