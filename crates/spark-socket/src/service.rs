//! 知名服务端口查询。
//!
//! 首次查询时读取系统服务数据库（`/etc/services`）并缓存；同名服务取文件中首个条目，
//! 不区分协议，与 `getservbyname(name, NULL)` 的文件后端一致。
//! 只读取本地文件，不经过 NSS，因此 `nsswitch.conf` 中配置的其它服务来源不会生效。
//! 数据库缺失或未收录时回落到内置的常用服务表。

use std::collections::HashMap;
use std::fs;
use std::sync::OnceLock;

use tracing::debug;

const SERVICES_PATH: &str = "/etc/services";

const BUILTIN: &[(&str, u16)] = &[
    ("ftp", 21),
    ("ssh", 22),
    ("telnet", 23),
    ("smtp", 25),
    ("domain", 53),
    ("tftp", 69),
    ("http", 80),
    ("pop3", 110),
    ("ntp", 123),
    ("imap", 143),
    ("snmp", 161),
    ("ldap", 389),
    ("https", 443),
    ("syslog", 514),
    ("rtsp", 554),
    ("sip", 5060),
];

/// 按服务名（不区分大小写）查询端口，返回主机序端口号。
pub fn lookup(name: &str) -> Option<u16> {
    if name.is_empty() {
        return None;
    }
    let name = name.to_ascii_lowercase();
    system_table()
        .get(&name)
        .copied()
        .or_else(|| builtin(&name))
}

fn builtin(name: &str) -> Option<u16> {
    BUILTIN
        .iter()
        .find(|(service, _)| *service == name)
        .map(|(_, port)| *port)
}

fn system_table() -> &'static HashMap<String, u16> {
    static TABLE: OnceLock<HashMap<String, u16>> = OnceLock::new();
    TABLE.get_or_init(|| match fs::read_to_string(SERVICES_PATH) {
        Ok(text) => {
            let table = parse_services(&text);
            debug!(path = SERVICES_PATH, entries = table.len(), "service database loaded");
            table
        }
        Err(err) => {
            debug!(path = SERVICES_PATH, error = %err, "service database unavailable");
            HashMap::new()
        }
    })
}

/// 解析 `services(5)` 格式：`name port/proto [aliases...] [# comment]`。
fn parse_services(text: &str) -> HashMap<String, u16> {
    let mut table = HashMap::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or_default();
        let mut fields = line.split_whitespace();
        let (Some(name), Some(port_proto)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some((port, proto)) = port_proto.split_once('/') else {
            continue;
        };
        let Ok(port) = port.parse::<u16>() else {
            continue;
        };
        if proto.is_empty() {
            continue;
        }
        for alias in std::iter::once(name).chain(fields) {
            table.entry(alias.to_ascii_lowercase()).or_insert(port);
        }
    }
    table
}
