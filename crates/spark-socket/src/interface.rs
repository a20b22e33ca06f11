//! 网络接口查询。
//!
//! # 教案式说明
//! - **意图（Why）**：`bind_device` 需要真实存在的网卡名；部署前列出接口、核对标志位与地址，
//!   可以把“网卡名写错”从运行期失败提前到配置检查。
//! - **逻辑（How）**：名称与索引来自 `if_nameindex`/`if_nametoindex`，标志与 IPv4 地址来自
//!   `getifaddrs`，MTU 读取 `/sys/class/net/<name>/mtu`。
//! - **契约（What）**：只采集 IPv4 地址；sysfs 不可用时 `mtu` 为 `None`。

use std::fs;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};

use nix::ifaddrs::getifaddrs;
use nix::net::if_::{InterfaceFlags, if_nameindex, if_nametoindex};
use nix::sys::socket::SockaddrStorage;
use tracing::info;

use crate::error::{INTERFACE, SocketError};

/// 列出系统中所有网络接口的名称。
pub fn list_interfaces() -> Result<Vec<String>, SocketError> {
    let interfaces =
        if_nameindex().map_err(|errno| SocketError::os(INTERFACE, io::Error::from(errno)))?;
    Ok(interfaces
        .iter()
        .map(|iface| iface.name().to_string_lossy().into_owned())
        .collect())
}

/// 单个网络接口的快照。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceInfo {
    name: String,
    index: u32,
    flags: InterfaceFlags,
    addr: Option<Ipv4Addr>,
    netmask: Option<Ipv4Addr>,
    broadcast: Option<Ipv4Addr>,
    mtu: Option<u32>,
}

impl InterfaceInfo {
    /// 查询名为 `name` 的接口；接口不存在时返回 `ENODEV` 类错误。
    pub fn query(name: &str) -> Result<Self, SocketError> {
        let index = if_nametoindex(name)
            .map_err(|errno| SocketError::os(INTERFACE, io::Error::from(errno)))?;

        let mut info = Self {
            name: name.to_owned(),
            index,
            flags: InterfaceFlags::empty(),
            addr: None,
            netmask: None,
            broadcast: None,
            mtu: read_mtu(name),
        };

        let entries =
            getifaddrs().map_err(|errno| SocketError::os(INTERFACE, io::Error::from(errno)))?;
        for entry in entries.filter(|entry| entry.interface_name == name) {
            info.flags |= entry.flags;
            if info.addr.is_none() {
                if let Some(addr) = ipv4_of(entry.address.as_ref()) {
                    info.addr = Some(addr);
                    info.netmask = ipv4_of(entry.netmask.as_ref());
                    info.broadcast = ipv4_of(entry.broadcast.as_ref());
                }
            }
        }
        Ok(info)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn addr(&self) -> Option<Ipv4Addr> {
        self.addr
    }

    pub fn netmask(&self) -> Option<Ipv4Addr> {
        self.netmask
    }

    pub fn broadcast(&self) -> Option<Ipv4Addr> {
        self.broadcast
    }

    pub fn mtu(&self) -> Option<u32> {
        self.mtu
    }

    pub fn is_up(&self) -> bool {
        self.flags.contains(InterfaceFlags::IFF_UP)
    }

    pub fn is_running(&self) -> bool {
        self.flags.contains(InterfaceFlags::IFF_RUNNING)
    }

    pub fn is_loopback(&self) -> bool {
        self.flags.contains(InterfaceFlags::IFF_LOOPBACK)
    }

    pub fn supports_multicast(&self) -> bool {
        self.flags.contains(InterfaceFlags::IFF_MULTICAST)
    }

    pub fn is_point_to_point(&self) -> bool {
        self.flags.contains(InterfaceFlags::IFF_POINTOPOINT)
    }

    pub fn has_broadcast(&self) -> bool {
        self.flags.contains(InterfaceFlags::IFF_BROADCAST)
    }

    pub fn is_promiscuous(&self) -> bool {
        self.flags.contains(InterfaceFlags::IFF_PROMISC)
    }
}

/// 以 `info!` 事件逐个输出所有接口的摘要。
pub fn dump_interfaces() -> Result<(), SocketError> {
    for name in list_interfaces()? {
        let iface = InterfaceInfo::query(&name)?;
        info!(
            interface = iface.name(),
            index = iface.index(),
            up = iface.is_up(),
            running = iface.is_running(),
            loopback = iface.is_loopback(),
            multicast = iface.supports_multicast(),
            addr = ?iface.addr(),
            netmask = ?iface.netmask(),
            broadcast = ?iface.broadcast(),
            mtu = ?iface.mtu(),
            "network interface"
        );
    }
    Ok(())
}

fn ipv4_of(addr: Option<&SockaddrStorage>) -> Option<Ipv4Addr> {
    addr.and_then(SockaddrStorage::as_sockaddr_in)
        .map(|sin| *SocketAddrV4::from(*sin).ip())
}

fn read_mtu(name: &str) -> Option<u32> {
    fs::read_to_string(format!("/sys/class/net/{name}/mtu"))
        .ok()
        .and_then(|text| text.trim().parse().ok())
}
