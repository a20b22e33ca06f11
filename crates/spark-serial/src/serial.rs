//! 行模式串口端点。
//!
//! # 教案式说明
//! - **意图（Why）**：调试控制台、AT 指令模组等设备以“按行收发”为主，打开即可用、关闭即复原；
//! - **逻辑（How）**：打开阶段直接在 `File` 上完成保存、改写与冲刷行规程，随后把描述符移交
//!   [`FdStream`]；析构时借用同一描述符写回原设置；
//! - **契约（What）**：打开失败不会留下已改写的行规程；恢复失败只记录 `warn!`。

use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::libc;
use nix::sys::termios::Termios;
use spark_stream::{ByteStream, FdStream, IoError, OperationKind};
use tracing::{debug, warn};

use crate::line::LineReader;
use crate::termios::{self, BaudRate, OPEN, TCGETATTR, TCSETATTR, TerminalSettings};

/// 行模式串口端点。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 以“按行读取”为主要用法的串口设备（调试控制台、AT 指令模组）只需一次 `open` 即可使用；
/// - 行读取与原始读取共享同一预读队列，两种用法可以任意交替。
///
/// ## 逻辑（How）
/// 1. 以 `O_NOCTTY | O_SYNC` 打开设备，避免成为控制终端；
/// 2. 保存原行规程，应用 8N1、忽略调制解调器控制线、规范输入、仅保留 VEOF 的设置；
/// 3. 丢弃打开前积压的输入后立即生效；
/// 4. 析构时恢复原行规程，失败只记录告警。
///
/// ## 契约（What）
/// - `read`：预读队列非空时只返回队列中的字节，不触碰设备；
/// - `read_line`：见 [`LineReader::read_line`]；
/// - `can_read`：预读字节数加上内核中待读字节数。
///
/// ## 风险提示（Trade-offs）
/// - 规范模式下内核按行交付数据，单行长度受内核行缓冲上限约束（Linux 为 4095 字节）。
pub struct SerialEndpoint {
    stream: FdStream,
    saved: Termios,
    lines: LineReader,
    device: PathBuf,
    baud: BaudRate,
}

impl SerialEndpoint {
    pub fn open(device: impl AsRef<Path>, baud: BaudRate) -> Result<Self, IoError> {
        let device = device.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_SYNC)
            .open(device)
            .map_err(|err| IoError::new(OPEN, err))?;
        let saved = termios::get(file.as_fd())?;
        let settings = termios::line_mode(&saved, baud)?;
        termios::flush_input(file.as_fd())?;
        termios::set(file.as_fd(), &settings)?;

        let stream = FdStream::from(OwnedFd::from(file));
        debug!(device = %device.display(), fd = stream.raw_fd(), %baud, "serial endpoint opened");

        Ok(Self {
            stream,
            saved,
            lines: LineReader::new(),
            device: device.to_path_buf(),
            baud,
        })
    }

    /// 读取下一行，去掉结尾的 `\r`/`\n`。
    pub fn read_line(&mut self) -> Result<String, IoError> {
        self.lines.read_line(&mut self.stream)
    }

    /// 当前生效的行规程快照。
    pub fn applied_settings(&self) -> Result<TerminalSettings, IoError> {
        let current = termios::get(self.borrowed(TCGETATTR)?)?;
        Ok(TerminalSettings::from_termios(&current))
    }

    /// 打开前保存、析构时恢复的原行规程。
    pub fn saved_settings(&self) -> TerminalSettings {
        TerminalSettings::from_termios(&self.saved)
    }

    pub fn set_nonblocking(&self, enabled: bool) -> Result<(), IoError> {
        self.stream.set_nonblocking(enabled)
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    pub fn baud_rate(&self) -> BaudRate {
        self.baud
    }

    pub fn raw_fd(&self) -> RawFd {
        self.stream.raw_fd()
    }

    /// 预读队列中尚未消费的字节。
    pub fn buffered(&self) -> &[u8] {
        self.lines.buffered()
    }

    fn borrowed(&self, op: OperationKind) -> Result<BorrowedFd<'_>, IoError> {
        self.stream
            .handle()
            .as_fd()
            .ok_or_else(|| IoError::new(op, io::Error::from(Errno::EBADF)))
    }
}

impl fmt::Debug for SerialEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialEndpoint")
            .field("device", &self.device)
            .field("fd", &self.stream.raw_fd())
            .field("baud", &self.baud)
            .field("buffered", &self.lines.buffered().len())
            .finish_non_exhaustive()
    }
}

impl AsRawFd for SerialEndpoint {
    fn as_raw_fd(&self) -> RawFd {
        self.raw_fd()
    }
}

impl ByteStream for SerialEndpoint {
    type Error = IoError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        if self.lines.has_buffered() {
            return Ok(self.lines.read_buffered(buf));
        }
        self.stream.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        self.stream.write(buf)
    }

    fn can_read(&self) -> Result<usize, IoError> {
        Ok(self.lines.buffered().len() + self.stream.can_read()?)
    }

    fn can_write(&self) -> Result<usize, IoError> {
        self.stream.can_write()
    }
}

impl Drop for SerialEndpoint {
    fn drop(&mut self) {
        let fd = self.stream.raw_fd();
        let Ok(borrowed) = self.borrowed(TCSETATTR) else {
            return;
        };
        match termios::set(borrowed, &self.saved) {
            Ok(()) => debug!(device = %self.device.display(), fd, "serial settings restored"),
            Err(err) => warn!(
                device = %self.device.display(),
                fd,
                errno = err.errno(),
                error = %err,
                "failed to restore serial settings"
            ),
        }
    }
}
