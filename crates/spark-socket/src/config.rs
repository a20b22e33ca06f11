//! 声明式端点配置。
//!
//! # 教案式说明
//! - **意图（Why）**：部署时只需一段 TOML 即可描述端点，避免在代码中硬编码 URL、网卡名与 TTL。
//! - **逻辑（How）**：`serde` 反序列化为 [`EndpointConfig`]，再依次执行解析 → 建立 →
//!   非阻塞切换 → 组播 TTL。
//! - **契约（What）**：未知字段直接拒绝；任一步骤失败都以 [`ConfigError`] 返回，不会留下半建立的端点。
//!
//! ```toml
//! url = "udp://239.1.2.3:5000"
//! kind = "udp-receive"
//! bind_device = "eth0"
//! nonblocking = true
//! multicast_ttl = 4
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::addr::{EndpointAddress, SocketKind};
use crate::error::{AddressError, SocketError};
use crate::socket::SocketEndpoint;

/// 端点配置失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read endpoint config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid endpoint config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Socket(#[from] SocketError),
}

/// 单个套接字端点的配置。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub url: String,
    /// 显式套接字类型；缺省时按协议名推断。
    #[serde(default)]
    pub kind: SocketKind,
    #[serde(default)]
    pub bind_device: Option<String>,
    #[serde(default)]
    pub nonblocking: bool,
    #[serde(default)]
    pub multicast_ttl: Option<u32>,
}

impl EndpointConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// 仅解析地址，不触碰系统资源。
    pub fn address(&self) -> Result<EndpointAddress, AddressError> {
        EndpointAddress::parse(&self.url, self.kind)
    }
}

impl SocketEndpoint {
    /// 按配置建立端点并应用可选设置。
    pub fn from_config(config: &EndpointConfig) -> Result<Self, ConfigError> {
        let address = config.address()?;
        let mut endpoint = SocketEndpoint::open(address, config.bind_device.as_deref())?;
        if config.nonblocking {
            endpoint.set_nonblocking()?;
        }
        if let Some(ttl) = config.multicast_ttl {
            endpoint.set_multicast_ttl(ttl)?;
        }
        debug!(url = %config.url, kind = %endpoint.socket_kind(), "endpoint configured");
        Ok(endpoint)
    }
}
