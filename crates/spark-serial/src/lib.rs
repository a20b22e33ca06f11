#![doc = r#"
# spark-serial

## 模块使命（Why）
- **行模式串口**：打开终端设备即切换到 8N1、本地模式、规范输入，关闭时恢复原设置；
- **透明预读**：按行读取越过行尾的字节保存在预读队列中，原始读取会先取走它们。

## 核心契约（What）
- [`SerialEndpoint::open`] 打开失败返回 [`spark_stream::IoError`]；
- [`SerialEndpoint::read_line`] 返回去掉结尾 `\r`/`\n` 的下一行，流结束时返回已积累的部分行；
- [`LineReader`] 与端点解耦，可在任意 [`spark_stream::ByteStream`] 上复用。

## 风险提示（Trade-offs）
- 仅支持 Linux 的 `termios` 速率表；
- 析构时恢复设置失败只记录 `warn!`，不会传播。
"#]

pub mod config;
pub mod line;
pub mod serial;
pub mod termios;

pub use config::{ConfigError, SerialConfig};
pub use line::LineReader;
pub use serial::SerialEndpoint;
pub use termios::{BaudRate, TerminalSettings, UnsupportedBaudRate};
