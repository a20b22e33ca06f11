//! 非阻塞语义与错误通道验证。
//!
//! # 教案式说明
//! - **Why**：非阻塞端点必须把“暂无数据/暂无空间”表达为 `Ok(0)`，而不是阻塞或报错；
//!   对非服务端调用 accept 必须经同一错误通道失败。
//! - **How**：对端不读取时持续写入，直至内核缓冲区写满；在 UDP 与 TCP 客户端上调用 accept。
//! - **What**：测试若阻塞将表现为超时挂起；其余失败以 panic 报告。

use std::net::UdpSocket;

use spark_socket::{ByteStream, EndpointAddress, SocketEndpoint, SocketError, SocketKind};

fn open(url: &str, kind: SocketKind) -> SocketEndpoint {
    SocketEndpoint::open(EndpointAddress::parse(url, kind).expect("地址"), None)
        .expect("建立端点失败")
}

fn free_udp_port() -> u16 {
    let probe = UdpSocket::bind("127.0.0.1:0").expect("探测端口失败");
    probe.local_addr().expect("读取探测端口失败").port()
}

fn tcp_pair() -> (SocketEndpoint, SocketEndpoint) {
    let server = open("tcp://127.0.0.1:0", SocketKind::TcpServer);
    let port = server.local_addr().expect("监听端口").port();
    let client = open(&format!("tcp://127.0.0.1:{port}"), SocketKind::TcpClient);
    let accepted = server.accept_client().expect("接受连接失败");
    (client, accepted)
}

#[test]
fn idle_udp_read_returns_zero() {
    let url = format!("udp://127.0.0.1:{}", free_udp_port());
    let mut receiver = open(&url, SocketKind::Udp);
    assert!(!receiver.is_nonblocking());
    receiver.set_nonblocking().expect("切换非阻塞失败");
    assert!(receiver.is_nonblocking());

    let mut buf = [0u8; 64];
    for _ in 0..3 {
        assert_eq!(receiver.read(&mut buf).expect("非阻塞读不应失败"), 0);
    }
}

#[test]
fn idle_tcp_read_returns_zero() {
    let (_client, mut accepted) = tcp_pair();
    accepted.set_nonblocking().expect("切换非阻塞失败");
    let mut buf = [0u8; 64];
    assert_eq!(accepted.read(&mut buf).expect("非阻塞读不应失败"), 0);
}

#[test]
fn flooding_nonblocking_writer_never_blocks() {
    let (mut client, _accepted) = tcp_pair();
    client.set_nonblocking().expect("切换非阻塞失败");
    // 对端始终不读取，发送与接收缓冲区终将写满。
    let chunk = vec![0x42u8; client.send_buffer_size().max(4096)];

    let mut saw_short_write = false;
    let mut total = 0usize;
    for _ in 0..10_000 {
        let n = client.write(&chunk).expect("非阻塞写不应失败");
        total += n;
        if n < chunk.len() {
            saw_short_write = true;
        }
        if n == 0 {
            break;
        }
    }
    assert!(saw_short_write, "写入 {total} 字节后仍未出现部分写入");
    assert!(total > 0);
    assert_eq!(client.write(&chunk).expect("写满后返回 0"), 0);
}

#[test]
fn accept_on_udp_endpoint_fails() {
    let url = format!("udp://127.0.0.1:{}", free_udp_port());
    let udp = open(&url, SocketKind::Udp);
    let err = udp.accept_client().expect_err("UDP 不能 accept");
    assert!(matches!(err, SocketError::Os { .. }));
    assert_eq!(err.code(), "spark.socket.accept_failed");
    assert!(err.errno().is_some(), "错误应携带内核 errno");
}

#[test]
fn accept_on_tcp_client_fails() {
    let (client, _accepted) = tcp_pair();
    let err = client.accept_client().expect_err("客户端不能 accept");
    assert_eq!(err.code(), "spark.socket.accept_failed");
}
