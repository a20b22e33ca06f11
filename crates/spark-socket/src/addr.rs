//! 端点地址：`scheme://host[:port][/path-or-query]`。
//!
//! # 教案式说明
//! - **意图（Why）**：端点只接受一行 URL 风格文本即可描述 UDP、TCP、组播等不同传输，
//!   套接字类型可由调用方显式给出，也可由协议名推断。
//! - **逻辑（How）**：按 `://` 切出协议；在第一个 `/` 之前寻找第一个 `:` 分离主机与端口；
//!   缺省端口时查询知名服务表；主机先按 IPv4 字面量解析，否则走系统解析器取首个 IPv4 结果。
//! - **契约（What）**：解析后的 [`EndpointAddress`] 不可变；路径/查询部分按原样保留，不做解码。

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4, ToSocketAddrs};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::AddressError;
use crate::service;

/// 端点的传输模式，决定套接字建立流程。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SocketKind {
    #[default]
    Unknown,
    Raw,
    /// 双向 UDP：绑定本地地址，可收可发。
    Udp,
    /// 仅接收的 UDP：与 `Udp` 建立流程相同。
    UdpReceive,
    /// 仅发送的 UDP：不绑定本地地址，也不加入组播。
    UdpSend,
    TcpClient,
    TcpServer,
    Sctp,
}

impl SocketKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Raw => "raw",
            Self::Udp => "udp",
            Self::UdpReceive => "udp-receive",
            Self::UdpSend => "udp-send",
            Self::TcpClient => "tcp-client",
            Self::TcpServer => "tcp-server",
            Self::Sctp => "sctp",
        }
    }

    pub fn is_udp(self) -> bool {
        matches!(self, Self::Udp | Self::UdpReceive | Self::UdpSend)
    }

    pub fn is_tcp(self) -> bool {
        matches!(self, Self::TcpClient | Self::TcpServer)
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 由协议名推断出的应用层协议类别，仅在套接字类型由协议推断时填充。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProtocolType {
    #[default]
    Unknown,
    Raw,
    Http,
    Https,
}

/// 已解析的端点地址。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 一次解析、处处复用：套接字建立时直接使用缓存的 IPv4 地址与端口，避免重复解析；
/// - 保留原始 URL 以便日志与 `Display` 输出。
///
/// ## 契约（What）
/// - `port()` 为主机序；`socket_addr()` 交给 `socket2` 时再转换为网络序；
/// - `query()` 为第一个 `/` 起的全部文本，缺省为空串；
/// - `is_multicast()`：IPv4 地址位于 224.0.0.0/4 时为真。
///
/// ## 风险提示（Trade-offs）
/// - 仅支持 IPv4，与端点的套接字建立流程一致；
/// - 主机名解析可能阻塞在系统解析器上，应在建立端点前完成。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointAddress {
    url: String,
    scheme: String,
    host: String,
    port: u16,
    query: String,
    kind: SocketKind,
    protocol: ProtocolType,
    ip: Ipv4Addr,
}

impl EndpointAddress {
    /// 解析 `url`；`hint` 为 [`SocketKind::Unknown`] 时按协议名推断套接字类型。
    pub fn parse(url: &str, hint: SocketKind) -> Result<Self, AddressError> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| AddressError::MissingScheme(url.to_owned()))?;

        let (authority, query) = match rest.find('/') {
            Some(slash) => rest.split_at(slash),
            None => (rest, ""),
        };

        let (host, port) = match authority.split_once(':') {
            Some((host, port_text)) => {
                let port = port_text
                    .parse::<u16>()
                    .map_err(|_| AddressError::InvalidPort(url.to_owned()))?;
                (host, port)
            }
            None => {
                let port = service::lookup(scheme)
                    .ok_or_else(|| AddressError::UnresolvedPort(url.to_owned()))?;
                (authority, port)
            }
        };

        if host.is_empty() {
            return Err(AddressError::MissingHost(url.to_owned()));
        }

        let ip = resolve_ipv4(host, port)
            .ok_or_else(|| AddressError::UnresolvedHost(url.to_owned()))?;

        let (kind, protocol) = if hint == SocketKind::Unknown && !scheme.is_empty() {
            infer_kind(scheme)
        } else {
            (hint, ProtocolType::Unknown)
        };

        Ok(Self {
            url: url.to_owned(),
            scheme: scheme.to_owned(),
            host: host.to_owned(),
            port,
            query: query.to_owned(),
            kind,
            protocol,
            ip,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn socket_kind(&self) -> SocketKind {
        self.kind
    }

    pub fn protocol_type(&self) -> ProtocolType {
        self.protocol
    }

    pub fn ipv4(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }

    pub fn is_multicast(&self) -> bool {
        self.ip.is_multicast()
    }

    /// 以另一种套接字类型描述同一地址，其余字段保持不变。
    pub fn with_kind(&self, kind: SocketKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }
}

impl FromStr for EndpointAddress {
    type Err = AddressError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        Self::parse(url, SocketKind::Unknown)
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

fn infer_kind(scheme: &str) -> (SocketKind, ProtocolType) {
    match scheme.to_ascii_lowercase().as_str() {
        "http" => (SocketKind::TcpClient, ProtocolType::Http),
        "https" => (SocketKind::TcpClient, ProtocolType::Https),
        "tcp" => (SocketKind::TcpClient, ProtocolType::Unknown),
        "udp" => (SocketKind::Udp, ProtocolType::Unknown),
        _ => (SocketKind::Unknown, ProtocolType::Unknown),
    }
}

fn resolve_ipv4(host: &str, port: u16) -> Option<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Some(ip);
    }
    (host, port)
        .to_socket_addrs()
        .ok()?
        .find_map(|addr| match addr {
            std::net::SocketAddr::V4(v4) => Some(*v4.ip()),
            std::net::SocketAddr::V6(_) => None,
        })
}
