//! TCP 服务端接受单个客户端后的全双工字节流验证，含 splice 零拷贝路径。
//!
//! # 教案式说明
//! - **Why**：确保任一侧写出的完整字节序列被另一侧按序、完整地读到，覆盖小于缓冲区的小负载
//!   与跨越多个内核缓冲区的大负载。
//! - **How**：服务端监听 `127.0.0.1:0`，经 `local_addr` 取回端口；客户端连接后服务端接受，
//!   写端在独立线程运行，写完后 flush 并关闭，读端读到 EOF 为止，最后比较 SHA-256；
//!   splice 另覆盖小负载与非阻塞端点面对空管道的场景。
//! - **What**：每个测试返回 `()`；失败时 panic 并附带阶段说明。

use std::thread;

use rand::{RngCore, SeedableRng, rngs::StdRng};
use sha2::{Digest, Sha256};
use spark_socket::{ByteStream, EndpointAddress, FdStream, SocketEndpoint, SocketKind};

const CHUNK: usize = 64 * 1024;

/// 建立一对已连接的端点：`(客户端, 服务端接受的连接)`。
fn connected_pair() -> (SocketEndpoint, SocketEndpoint) {
    let server = SocketEndpoint::open(
        EndpointAddress::parse("tcp://127.0.0.1:0", SocketKind::TcpServer).expect("监听地址"),
        None,
    )
    .expect("建立服务端失败");
    let port = server.local_addr().expect("读取监听端口失败").port();

    let url = format!("tcp://127.0.0.1:{port}");
    let client = SocketEndpoint::open(url.parse().expect("客户端地址"), None)
        .expect("客户端连接失败");
    assert_eq!(client.socket_kind(), SocketKind::TcpClient);

    let accepted = server.accept_client().expect("接受连接失败");
    assert_eq!(accepted.socket_kind(), SocketKind::TcpClient);
    assert_eq!(accepted.address().host(), "127.0.0.1");
    (client, accepted)
}

fn random_payload(len: usize, seed: u64) -> Vec<u8> {
    let mut payload = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut payload);
    payload
}

fn read_to_end(endpoint: &mut SocketEndpoint) -> Vec<u8> {
    let mut received = Vec::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = endpoint.read(&mut buf).expect("读取失败");
        if n == 0 {
            return received;
        }
        received.extend_from_slice(&buf[..n]);
    }
}

/// 从套接字读满 `len` 字节。
fn read_exact(endpoint: &mut SocketEndpoint, len: usize) -> Vec<u8> {
    let mut received = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = endpoint.read(&mut received[filled..]).expect("读取失败");
        assert!(n > 0, "连接提前关闭");
        filled += n;
    }
    received
}

/// 在独立线程中写完 `payload` 后 flush 并关闭写端。
fn send_all(mut writer: SocketEndpoint, payload: Vec<u8>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for chunk in payload.chunks(CHUNK) {
            assert_eq!(writer.write_all(chunk).expect("写入失败"), chunk.len());
        }
        writer.flush().expect("flush 失败");
        writer.close();
    })
}

#[test]
fn small_payload_client_to_server() {
    let (mut client, mut accepted) = connected_pair();
    assert_eq!(client.write_str("hello, server").expect("写入失败"), 13);
    client.flush().expect("flush 失败");

    assert_eq!(read_exact(&mut accepted, 13), b"hello, server");
}

#[test]
fn large_payload_server_to_client() {
    let (mut client, accepted) = connected_pair();
    let payload = random_payload(8 * accepted.send_buffer_size().max(CHUNK), 7);
    let expected = Sha256::digest(&payload);
    let expected_len = payload.len();

    let writer = send_all(accepted, payload);
    let received = read_to_end(&mut client);
    writer.join().expect("写线程 panic");

    assert_eq!(received.len(), expected_len);
    assert_eq!(Sha256::digest(&received), expected);
}

#[test]
fn large_payload_client_to_server() {
    let (client, mut accepted) = connected_pair();
    let payload = random_payload(4 << 20, 11);
    let expected = Sha256::digest(&payload);

    let writer = send_all(client, payload);
    let received = read_to_end(&mut accepted);
    writer.join().expect("写线程 panic");

    assert_eq!(received.len(), 4 << 20);
    assert_eq!(Sha256::digest(&received), expected);
}

#[test]
fn spliced_payload_arrives_intact() {
    let (mut client, mut accepted) = connected_pair();
    let payload = random_payload(3 << 20, 23);
    let expected = Sha256::digest(&payload);

    let (pipe_reader, mut pipe_writer) = FdStream::pipe().expect("创建管道失败");
    let feeder = thread::spawn(move || {
        assert_eq!(pipe_writer.write_all(&payload).expect("写管道失败"), payload.len());
    });
    let splicer = thread::spawn(move || {
        let mut moved = 0;
        loop {
            match client.splice_write(&pipe_reader, CHUNK).expect("splice 失败") {
                0 => break,
                n => moved += n,
            }
        }
        client.flush().expect("flush 失败");
        client.close();
        moved
    });

    let received = read_to_end(&mut accepted);
    feeder.join().expect("写管道线程 panic");
    let moved = splicer.join().expect("splice 线程 panic");

    assert_eq!(moved, 3 << 20);
    assert_eq!(received.len(), 3 << 20);
    assert_eq!(Sha256::digest(&received), expected);
}

#[test]
fn spliced_small_payload_arrives_intact() {
    let (mut client, mut accepted) = connected_pair();
    let (pipe_reader, mut pipe_writer) = FdStream::pipe().expect("创建管道失败");
    pipe_writer.write_str("ping").expect("写管道失败");

    assert_eq!(client.splice_write(&pipe_reader, CHUNK).expect("splice 失败"), 4);
    client.flush().expect("flush 失败");
    assert_eq!(read_exact(&mut accepted, 4), b"ping");
}

#[test]
fn nonblocking_splice_from_empty_pipe_returns_zero() {
    let (mut client, mut accepted) = connected_pair();
    client.set_nonblocking().expect("切换非阻塞失败");
    // 写端保持打开：管道为空但未到 EOF，阻塞模式下 splice 会一直等待。
    let (pipe_reader, mut pipe_writer) = FdStream::pipe().expect("创建管道失败");

    assert_eq!(client.splice_write(&pipe_reader, CHUNK).expect("splice 失败"), 0);

    pipe_writer.write_str("hello").expect("写管道失败");
    assert_eq!(client.splice_write(&pipe_reader, CHUNK).expect("splice 失败"), 5);
    client.flush().expect("flush 失败");
    assert_eq!(read_exact(&mut accepted, 5), b"hello");
}

#[test]
fn write_headroom_is_bounded_by_send_buffer() {
    let (client, _accepted) = connected_pair();
    let headroom = client.can_write().expect("查询失败");
    assert!(headroom > 0);
    assert!(headroom <= client.send_buffer_size());
    assert_eq!(client.can_read().expect("查询失败"), 0);
}
