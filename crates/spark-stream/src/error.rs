//! 描述符层的错误分类。
//!
//! # 教案式说明
//! - **意图（Why）**：所有端点共享同一套“操作码 + 原始 errno”错误表达，上层无需关心失败发生在
//!   管道、普通文件还是串口上，只需读取稳定错误码即可分流处理。
//! - **逻辑（How）**：每个底层调用对应一个 [`OperationKind`] 常量；失败时由 [`IoError::new`]
//!   携带操作码、调用位置与 `std::io::Error` 一并返回。
//! - **契约（What）**：`WouldBlock` 永远不会以错误形式出现，统一在 [`drive_io`] 中被吸收为 `Ok(0)`。

use std::io;
use std::panic::Location;

use thiserror::Error;

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

impl OperationKind {
    /// 构造操作描述，供下游 crate 声明自身的操作常量。
    pub const fn new(code: &'static str, message: &'static str) -> Self {
        Self { code, message }
    }
}

pub const READ: OperationKind = OperationKind::new("spark.stream.read_failed", "fd read");
pub const WRITE: OperationKind = OperationKind::new("spark.stream.write_failed", "fd write");
pub const POLL: OperationKind = OperationKind::new("spark.stream.poll_failed", "fd poll");
pub const IOCTL: OperationKind = OperationKind::new("spark.stream.ioctl_failed", "fd ioctl");
pub const FCNTL: OperationKind = OperationKind::new("spark.stream.fcntl_failed", "fd fcntl");
pub const PIPE: OperationKind = OperationKind::new("spark.stream.pipe_failed", "pipe create");
pub const OPEN: OperationKind = OperationKind::new("spark.stream.open_failed", "fd open");

/// 通用描述符级失败。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 保留原始 errno，调用方可以据此区分 `EBADF`（句柄已关闭）与 `EPIPE`（对端离开）等场景；
/// - 附带调用位置，排障时能够直接定位到发起系统调用的代码行。
///
/// ## 契约（What）
/// - `op()`：失败的操作；`errno()`：原始 OS 错误码（若存在）；
/// - `Display` 形如 `fd read (src/fd.rs:88:17): Bad file descriptor (os error 9)`。
#[derive(Debug, Error)]
#[error("{msg} ({location}): {source}", msg = .op.message)]
pub struct IoError {
    op: OperationKind,
    location: &'static Location<'static>,
    #[source]
    source: io::Error,
}

impl IoError {
    /// 以调用者位置构造错误。
    #[track_caller]
    pub fn new(op: OperationKind, source: io::Error) -> Self {
        Self::with_location(op, Location::caller(), source)
    }

    /// 读取 `errno` 并构造错误，必须紧跟在失败的系统调用之后调用。
    #[track_caller]
    pub fn last_os_error(op: OperationKind) -> Self {
        Self::with_location(op, Location::caller(), io::Error::last_os_error())
    }

    /// 显式指定位置，供其它错误类型无损转换时使用。
    pub fn with_location(
        op: OperationKind,
        location: &'static Location<'static>,
        source: io::Error,
    ) -> Self {
        Self {
            op,
            location,
            source,
        }
    }

    pub fn op(&self) -> OperationKind {
        self.op
    }

    /// 稳定错误码，例如 `spark.stream.read_failed`。
    pub fn code(&self) -> &'static str {
        self.op.code
    }

    /// 原始 OS 错误码。
    pub fn errno(&self) -> Option<i32> {
        self.source.raw_os_error()
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    pub fn into_io(self) -> io::Error {
        self.source
    }
}

/// 执行一次可能被信号打断的 IO 调用，并吸收非阻塞场景下的 `WouldBlock`。
///
/// # 逻辑（How）
/// 1. `Interrupted` 表示系统调用尚未执行，直接重试；
/// 2. `WouldBlock` 转换为 `Ok(0)`，由调用方按自身节奏轮询；
/// 3. 其余错误原样返回。
pub fn drive_io<F>(mut call: F) -> io::Result<usize>
where
    F: FnMut() -> io::Result<usize>,
{
    loop {
        match call() {
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(0),
            Err(err) => return Err(err),
        }
    }
}
