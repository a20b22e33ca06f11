//! 终端行规程：波特率表、设置快照与读写。
//!
//! # 教案式说明
//! - **意图（Why）**：串口端点在打开时改写行规程、关闭时恢复；把 `termios` 的读写与波特率映射
//!   收拢在一处，端点本身只表达流程。
//! - **逻辑（How）**：经 `nix::sys::termios` 调用 `tcgetattr`/`tcsetattr`/`tcflush`/`cfsetspeed`；
//!   [`BaudRate`] 把每秒位数映射到 nix 的速率枚举，只接受 Linux 支持的速率。
//! - **契约（What）**：[`line_mode`] 只依赖传入的原设置与速率，不触碰描述符，便于单测。

use std::fmt;
use std::io;
use std::os::fd::BorrowedFd;

use nix::sys::termios::{
    self as nix_termios, BaudRate as Speed, ControlFlags, FlushArg, InputFlags, LocalFlags,
    OutputFlags, SetArg, SpecialCharacterIndices, Termios,
};
use spark_stream::{IoError, OperationKind};
use thiserror::Error;

pub const OPEN: OperationKind = OperationKind::new("spark.serial.open_failed", "serial open");
pub const TCGETATTR: OperationKind =
    OperationKind::new("spark.serial.tcgetattr_failed", "serial tcgetattr");
pub const TCSETATTR: OperationKind =
    OperationKind::new("spark.serial.tcsetattr_failed", "serial tcsetattr");
pub const TCFLUSH: OperationKind =
    OperationKind::new("spark.serial.tcflush_failed", "serial tcflush");
pub const CFSETSPEED: OperationKind =
    OperationKind::new("spark.serial.cfsetspeed_failed", "serial cfsetspeed");

/// 行模式下的文件结束字符（Ctrl-D）。
const EOF_CHAR: u8 = 0x04;

const RATES: &[(u32, Speed)] = &[
    (50, Speed::B50),
    (75, Speed::B75),
    (110, Speed::B110),
    (134, Speed::B134),
    (150, Speed::B150),
    (200, Speed::B200),
    (300, Speed::B300),
    (600, Speed::B600),
    (1_200, Speed::B1200),
    (1_800, Speed::B1800),
    (2_400, Speed::B2400),
    (4_800, Speed::B4800),
    (9_600, Speed::B9600),
    (19_200, Speed::B19200),
    (38_400, Speed::B38400),
    (57_600, Speed::B57600),
    (115_200, Speed::B115200),
    (230_400, Speed::B230400),
    (460_800, Speed::B460800),
    (500_000, Speed::B500000),
    (576_000, Speed::B576000),
    (921_600, Speed::B921600),
    (1_000_000, Speed::B1000000),
    (1_152_000, Speed::B1152000),
    (1_500_000, Speed::B1500000),
    (2_000_000, Speed::B2000000),
    (2_500_000, Speed::B2500000),
    (3_000_000, Speed::B3000000),
    (3_500_000, Speed::B3500000),
    (4_000_000, Speed::B4000000),
];

/// 不在速率表中的波特率。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported baud rate: {0}")]
pub struct UnsupportedBaudRate(pub u32);

/// 经速率表校验的波特率。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BaudRate {
    bits_per_second: u32,
    speed: Speed,
}

impl BaudRate {
    pub const B9600: Self = Self {
        bits_per_second: 9_600,
        speed: Speed::B9600,
    };
    pub const B115200: Self = Self {
        bits_per_second: 115_200,
        speed: Speed::B115200,
    };

    pub fn new(bits_per_second: u32) -> Result<Self, UnsupportedBaudRate> {
        RATES
            .iter()
            .find(|(rate, _)| *rate == bits_per_second)
            .map(|&(bits_per_second, speed)| Self {
                bits_per_second,
                speed,
            })
            .ok_or(UnsupportedBaudRate(bits_per_second))
    }

    pub fn bits_per_second(self) -> u32 {
        self.bits_per_second
    }

    /// 对应的 nix 速率枚举。
    pub fn speed(self) -> Speed {
        self.speed
    }

    fn from_speed(speed: Speed) -> Option<Self> {
        RATES
            .iter()
            .find(|(_, code)| *code == speed)
            .map(|&(bits_per_second, speed)| Self {
                bits_per_second,
                speed,
            })
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        Self::B115200
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = UnsupportedBaudRate;

    fn try_from(bits_per_second: u32) -> Result<Self, Self::Error> {
        Self::new(bits_per_second)
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bps", self.bits_per_second)
    }
}

/// 已应用行规程的只读快照。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerminalSettings {
    pub input_flags: InputFlags,
    pub output_flags: OutputFlags,
    pub control_flags: ControlFlags,
    pub local_flags: LocalFlags,
    pub vmin: u8,
    pub vtime: u8,
    pub veof: u8,
    /// 输出速率；不在速率表中时为 `None`。
    pub speed: Option<BaudRate>,
}

impl TerminalSettings {
    pub(crate) fn from_termios(termios: &Termios) -> Self {
        let cc = &termios.control_chars;
        Self {
            input_flags: termios.input_flags,
            output_flags: termios.output_flags,
            control_flags: termios.control_flags,
            local_flags: termios.local_flags,
            vmin: cc[SpecialCharacterIndices::VMIN as usize],
            vtime: cc[SpecialCharacterIndices::VTIME as usize],
            veof: cc[SpecialCharacterIndices::VEOF as usize],
            speed: BaudRate::from_speed(nix_termios::cfgetospeed(termios)),
        }
    }

    pub fn is_canonical(&self) -> bool {
        self.local_flags.contains(LocalFlags::ICANON)
    }

    pub fn echoes(&self) -> bool {
        self.local_flags.contains(LocalFlags::ECHO)
    }

    /// 8 数据位、忽略调制解调器控制线且接收器已启用。
    pub fn is_raw_8bit_local(&self) -> bool {
        let flags = self.control_flags;
        flags & ControlFlags::CSIZE == ControlFlags::CS8
            && flags.contains(ControlFlags::CLOCAL | ControlFlags::CREAD)
            && !flags.intersects(ControlFlags::PARENB | ControlFlags::CSTOPB)
    }
}

pub(crate) fn get(fd: BorrowedFd<'_>) -> Result<Termios, IoError> {
    nix_termios::tcgetattr(fd).map_err(|errno| IoError::new(TCGETATTR, io::Error::from(errno)))
}

/// 立即应用设置（`TCSANOW`）。
pub(crate) fn set(fd: BorrowedFd<'_>, termios: &Termios) -> Result<(), IoError> {
    nix_termios::tcsetattr(fd, SetArg::TCSANOW, termios)
        .map_err(|errno| IoError::new(TCSETATTR, io::Error::from(errno)))
}

/// 丢弃尚未读取的输入。
pub(crate) fn flush_input(fd: BorrowedFd<'_>) -> Result<(), IoError> {
    nix_termios::tcflush(fd, FlushArg::TCIFLUSH)
        .map_err(|errno| IoError::new(TCFLUSH, io::Error::from(errno)))
}

/// 基于 `previous` 构造行模式设置：8N1、忽略调制解调器控制线、规范输入，
/// 控制字符仅保留 VEOF，并要求至少读到 1 个字符。
pub(crate) fn line_mode(previous: &Termios, baud: BaudRate) -> Result<Termios, IoError> {
    let mut termios = previous.clone();
    termios.control_flags = ControlFlags::CS8 | ControlFlags::CLOCAL | ControlFlags::CREAD;
    termios.input_flags = InputFlags::empty();
    termios.output_flags = OutputFlags::empty();
    termios.local_flags = LocalFlags::ICANON;
    termios.control_chars.fill(0);
    termios.control_chars[SpecialCharacterIndices::VEOF as usize] = EOF_CHAR;
    termios.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    termios.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    nix_termios::cfsetspeed(&mut termios, baud.speed())
        .map_err(|errno| IoError::new(CFSETSPEED, io::Error::from(errno)))?;
    Ok(termios)
}
