#![doc = r#"
# spark-socket

## 模块使命（Why）
- **一行 URL 建立端点**：`scheme://host[:port][/path]` 加可选网卡名即可建立 UDP、组播、
  TCP 客户端或 TCP 服务端，建立后统一以 [`spark_stream::ByteStream`] 能力读写。
- **零拷贝发送**：TCP 端点支持把管道中的数据经 `splice(2)` 直接送入套接字发送缓冲区。

## 核心契约（What）
- [`EndpointAddress`]：解析后不可变；缺省端口查询知名服务表；协议名可推断套接字类型；
- [`SocketEndpoint`]：按类型执行 bind/connect/listen/组播加入，失败返回 [`SocketError`]；
- 非阻塞端点上的“暂无数据/暂无空间”返回 `Ok(0)`，其余失败携带原始 errno 与稳定错误码；
- [`EndpointConfig`]：以 TOML 声明端点，[`SocketEndpoint::from_config`] 一步建立。

## 实现策略（How）
- 套接字创建与常规选项使用 `socket2`；`splice`、`TIOCOUTQ`、`TCP_NODELAY` 等经由 `nix`；
- 建立流程逐步以 `tracing::debug!` 记录，库本身从不安装订阅者。

## 风险提示（Trade-offs）
- 仅支持 IPv4 与 Linux；
- 同一端点不支持无同步的并发使用。
"#]

pub mod addr;
pub mod config;
pub mod error;
pub mod interface;
mod options;
pub mod service;
pub mod socket;

pub use addr::{EndpointAddress, ProtocolType, SocketKind};
pub use config::{ConfigError, EndpointConfig};
pub use error::{AddressError, SocketError, TransportError};
pub use interface::{InterfaceInfo, dump_interfaces, list_interfaces};
pub use socket::SocketEndpoint;
pub use spark_stream::{ByteStream, FdStream, IoError};
