//! 串口端点的声明式配置。
//!
//! ```toml
//! device = "/dev/ttyUSB0"
//! baud_rate = 9600
//! nonblocking = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use spark_stream::IoError;
use thiserror::Error;

use crate::serial::SerialEndpoint;
use crate::termios::{BaudRate, UnsupportedBaudRate};

const DEFAULT_BAUD_RATE: u32 = 115_200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read serial config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid serial config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    BaudRate(#[from] UnsupportedBaudRate),
    #[error(transparent)]
    Io(#[from] IoError),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialConfig {
    pub device: PathBuf,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub nonblocking: bool,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl SerialConfig {
    /// 解析并校验波特率。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.baud()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn baud(&self) -> Result<BaudRate, UnsupportedBaudRate> {
        BaudRate::new(self.baud_rate)
    }
}

impl SerialEndpoint {
    pub fn from_config(config: &SerialConfig) -> Result<Self, ConfigError> {
        let endpoint = SerialEndpoint::open(&config.device, config.baud()?)?;
        if config.nonblocking {
            endpoint.set_nonblocking(true)?;
        }
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baud_rate_defaults_to_115200() {
        let config = SerialConfig::from_toml_str(r#"device = "/dev/ttyS0""#).expect("config");
        assert_eq!(config.baud().expect("baud"), BaudRate::B115200);
        assert!(!config.nonblocking);
    }

    #[test]
    fn unsupported_baud_rate_is_rejected() {
        let err = SerialConfig::from_toml_str("device = \"/dev/ttyS0\"\nbaud_rate = 12345")
            .expect_err("bad rate");
        assert!(matches!(err, ConfigError::BaudRate(UnsupportedBaudRate(12_345))));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = SerialConfig::from_toml_str("device = \"/dev/ttyS0\"\nparity = \"even\"")
            .expect_err("unknown field");
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn missing_device_surfaces_open_error() {
        let config = SerialConfig::from_toml_str(r#"device = "/dev/spark-no-such-tty""#)
            .expect("config");
        match SerialEndpoint::from_config(&config) {
            Err(ConfigError::Io(err)) => {
                assert_eq!(err.code(), "spark.serial.open_failed");
                assert_eq!(err.errno(), Some(nix::libc::ENOENT));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
