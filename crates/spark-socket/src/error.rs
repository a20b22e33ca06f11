//! 套接字层错误分类。
//!
//! # 教案式说明
//! - **意图（Why）**：在描述符层 [`IoError`] 之上补充套接字语境（创建、绑定、连接、监听……），
//!   同时保证任何套接字失败都能无损回落为通用 `IoError`，供只关心字节流的调用方统一处理。
//! - **逻辑（How）**：每个系统调用对应一个 [`OperationKind`] 常量；非 OS 失败（未知套接字类型、
//!   对 UDP 调用 splice）使用独立变体表达，转换为 `IoError` 时保留稳定错误码与文案。
//! - **契约（What）**：地址解析失败永远是 [`AddressError`]，只在解析阶段出现一次。

use std::io;
use std::panic::Location;

use spark_stream::{IoError, OperationKind};
use thiserror::Error;

use crate::addr::SocketKind;

pub const CREATE: OperationKind = OperationKind::new("spark.socket.create_failed", "socket create");
pub const BIND: OperationKind = OperationKind::new("spark.socket.bind_failed", "socket bind");
pub const CONNECT: OperationKind =
    OperationKind::new("spark.socket.connect_failed", "socket connect");
pub const LISTEN: OperationKind = OperationKind::new("spark.socket.listen_failed", "socket listen");
pub const ACCEPT: OperationKind = OperationKind::new("spark.socket.accept_failed", "socket accept");
pub const SETSOCKOPT: OperationKind =
    OperationKind::new("spark.socket.setsockopt_failed", "socket setsockopt");
pub const GETSOCKOPT: OperationKind =
    OperationKind::new("spark.socket.getsockopt_failed", "socket getsockopt");
pub const READ: OperationKind = OperationKind::new("spark.socket.read_failed", "socket read");
pub const WRITE: OperationKind = OperationKind::new("spark.socket.write_failed", "socket write");
pub const SPLICE: OperationKind = OperationKind::new("spark.socket.splice_failed", "socket splice");
pub const IOCTL: OperationKind = OperationKind::new("spark.socket.ioctl_failed", "socket ioctl");
pub const FCNTL: OperationKind = OperationKind::new("spark.socket.fcntl_failed", "socket fcntl");
pub const INTERFACE: OperationKind =
    OperationKind::new("spark.socket.interface_failed", "interface query");

const UNKNOWN_KIND_CODE: &str = "spark.socket.unknown_kind";
const UNSUPPORTED_CODE: &str = "spark.socket.unsupported";

/// 套接字专属失败。
///
/// # 契约（What）
/// - `Os`：系统调用失败，保留操作码、调用位置与原始 errno；
/// - `UnknownKind`：地址解析出的套接字类型无法建立端点；
/// - `Unsupported`：操作对当前套接字类型无意义（例如对 UDP 执行 splice）。
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("{msg} ({location}): {source}", msg = .op.message)]
    Os {
        op: OperationKind,
        location: &'static Location<'static>,
        #[source]
        source: io::Error,
    },
    #[error("unknown socket kind: {0}")]
    UnknownKind(SocketKind),
    #[error("{0}")]
    Unsupported(&'static str),
}

impl SocketError {
    #[track_caller]
    pub fn os(op: OperationKind, source: io::Error) -> Self {
        Self::Os {
            op,
            location: Location::caller(),
            source,
        }
    }

    /// 读取 `errno` 并构造错误，必须紧跟在失败的系统调用之后调用。
    #[track_caller]
    pub fn last_os_error(op: OperationKind) -> Self {
        Self::os(op, io::Error::last_os_error())
    }

    /// 把描述符层错误改写为指定套接字操作，位置取套接字层调用点，errno 保持不变。
    #[track_caller]
    pub fn from_stream(op: OperationKind, err: IoError) -> Self {
        Self::os(op, err.into_io())
    }

    /// 稳定错误码，例如 `spark.socket.accept_failed`。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Os { op, .. } => op.code,
            Self::UnknownKind(_) => UNKNOWN_KIND_CODE,
            Self::Unsupported(_) => UNSUPPORTED_CODE,
        }
    }

    /// 原始 OS 错误码；非 OS 变体没有 errno。
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Os { source, .. } => source.raw_os_error(),
            Self::UnknownKind(_) | Self::Unsupported(_) => None,
        }
    }

    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::Os { source, .. } => source.kind(),
            Self::UnknownKind(_) => io::ErrorKind::InvalidInput,
            Self::Unsupported(_) => io::ErrorKind::Unsupported,
        }
    }
}

impl From<SocketError> for IoError {
    #[track_caller]
    fn from(err: SocketError) -> Self {
        match err {
            SocketError::Os {
                op,
                location,
                source,
            } => IoError::with_location(op, location, source),
            other => {
                let op = OperationKind::new(other.code(), "socket setup");
                let source = io::Error::new(other.kind(), other.to_string());
                IoError::new(op, source)
            }
        }
    }
}

/// 端点地址解析失败，每个变体都携带原始 URL。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("missing `scheme://` separator in `{0}`")]
    MissingScheme(String),
    #[error("empty host in `{0}`")]
    MissingHost(String),
    #[error("no port given and scheme has no well-known service port in `{0}`")]
    UnresolvedPort(String),
    #[error("invalid port in `{0}`")]
    InvalidPort(String),
    #[error("host does not resolve to an IPv4 address in `{0}`")]
    UnresolvedHost(String),
}

impl AddressError {
    pub fn url(&self) -> &str {
        match self {
            Self::MissingScheme(url)
            | Self::MissingHost(url)
            | Self::UnresolvedPort(url)
            | Self::InvalidPort(url)
            | Self::UnresolvedHost(url) => url,
        }
    }
}

/// 同时涉及地址解析与 IO 的调用方使用的汇总错误。
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Socket(#[from] SocketError),
}
