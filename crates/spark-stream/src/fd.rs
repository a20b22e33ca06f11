//! 任意描述符上的字节流。
//!
//! # 教案式说明
//! - **意图（Why）**：管道、普通文件、子进程标准流等“只需读写”的描述符不需要专门端点，
//!   统一由 [`FdStream`] 承载，并作为套接字与串口端点的内部基座。
//! - **逻辑（How）**：读写经 `nix::unistd` 调用 `read(2)`/`write(2)`，由 [`drive_io`] 吸收
//!   `EINTR` 与 `EAGAIN`；就绪查询委托给 [`crate::poll`]。
//! - **契约（What）**：句柄未设置时所有操作返回 `EBADF`，不会 panic。

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::process::{ChildStderr, ChildStdin, ChildStdout};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::unistd;
use tracing::debug;

use crate::error::{FCNTL, IoError, OperationKind, PIPE, POLL, READ, WRITE, drive_io};
use crate::handle::OwnedHandle;
use crate::poll;
use crate::stream::ByteStream;

/// 包装任意描述符的字节流。
#[derive(Debug, Default)]
pub struct FdStream {
    handle: OwnedHandle,
}

impl FdStream {
    pub fn new(handle: OwnedHandle) -> Self {
        Self { handle }
    }

    /// 创建一对带 `O_CLOEXEC` 的匿名管道，返回 `(读端, 写端)`。
    pub fn pipe() -> Result<(Self, Self), IoError> {
        let (reader, writer) = unistd::pipe2(OFlag::O_CLOEXEC)
            .map_err(|errno| IoError::new(PIPE, io::Error::from(errno)))?;
        debug!(
            reader = reader.as_raw_fd(),
            writer = writer.as_raw_fd(),
            "pipe created"
        );
        Ok((Self::from(reader), Self::from(writer)))
    }

    pub fn handle(&self) -> &OwnedHandle {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut OwnedHandle {
        &mut self.handle
    }

    pub fn into_handle(self) -> OwnedHandle {
        self.handle
    }

    pub fn raw_fd(&self) -> RawFd {
        self.handle.get()
    }

    /// 切换底层描述符的 `O_NONBLOCK` 标志。
    pub fn set_nonblocking(&self, enabled: bool) -> Result<(), IoError> {
        poll::set_nonblocking(self.borrowed(FCNTL)?, enabled)
    }

    pub fn is_nonblocking(&self) -> Result<bool, IoError> {
        poll::is_nonblocking(self.borrowed(FCNTL)?)
    }

    /// 关闭底层描述符，此后所有操作返回 `EBADF`。
    pub fn close(&mut self) {
        self.handle.reset();
    }

    /// 借用底层描述符；句柄未设置时以 `op` 报告 `EBADF`。
    fn borrowed(&self, op: OperationKind) -> Result<BorrowedFd<'_>, IoError> {
        self.handle
            .as_fd()
            .ok_or_else(|| IoError::new(op, io::Error::from(Errno::EBADF)))
    }
}

impl From<OwnedHandle> for FdStream {
    fn from(handle: OwnedHandle) -> Self {
        Self::new(handle)
    }
}

impl From<OwnedFd> for FdStream {
    fn from(fd: OwnedFd) -> Self {
        Self::new(OwnedHandle::from(fd))
    }
}

impl From<File> for FdStream {
    fn from(file: File) -> Self {
        Self::from(OwnedFd::from(file))
    }
}

impl From<ChildStdin> for FdStream {
    fn from(stdin: ChildStdin) -> Self {
        Self::from(OwnedFd::from(stdin))
    }
}

impl From<ChildStdout> for FdStream {
    fn from(stdout: ChildStdout) -> Self {
        Self::from(OwnedFd::from(stdout))
    }
}

impl From<ChildStderr> for FdStream {
    fn from(stderr: ChildStderr) -> Self {
        Self::from(OwnedFd::from(stderr))
    }
}

impl AsRawFd for FdStream {
    fn as_raw_fd(&self) -> RawFd {
        self.raw_fd()
    }
}

impl ByteStream for FdStream {
    type Error = IoError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let fd = self.borrowed(READ)?.as_raw_fd();
        drive_io(|| unistd::read(fd, buf).map_err(io::Error::from))
            .map_err(|err| IoError::new(READ, err))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        let fd = self.borrowed(WRITE)?;
        drive_io(|| unistd::write(fd, buf).map_err(io::Error::from))
            .map_err(|err| IoError::new(WRITE, err))
    }

    fn can_read(&self) -> Result<usize, IoError> {
        poll::readable_bytes(self.borrowed(POLL)?)
    }

    fn can_write(&self) -> Result<usize, IoError> {
        poll::writable_bytes(self.borrowed(POLL)?)
    }
}
