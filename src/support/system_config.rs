//-
// Copyright (c) 2026, The Mockmta Authors
//
// This file is part of Mockmta.
//
// Mockmta is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mockmta is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along
// with Mockmta. If not, see <http://www.gnu.org/licenses/>.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::support::error::Error;

/// The system-wide configuration for Mockmta.
///
/// This is stored in a TOML file passed with `--config`. Every section has a
/// sensible default so that the tool can start with no configuration at all.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Ordered storage layer stack, topmost first. The last entry is the
    /// root (authoritative) layer.
    #[serde(default, rename = "storage")]
    pub storages: Vec<StorageLayerConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SmtpConfig {
    /// Address the SMTP sink listens on.
    #[serde(default = "default_smtp_addr")]
    pub addr: String,
    /// Host name announced in the SMTP banner.
    #[serde(default = "default_host_name")]
    pub host_name: String,
    /// Upstream relay servers, keyed by name.
    #[serde(default)]
    pub relays: BTreeMap<String, RelayConfig>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        SmtpConfig {
            addr: default_smtp_addr(),
            host_name: default_host_name(),
            relays: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Address the HTTP API and front-end listen on.
    #[serde(default = "default_http_addr")]
    pub addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            addr: default_http_addr(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Relay every successfully stored message without being asked.
    #[serde(default)]
    pub auto_relay: bool,
    pub addr: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub mechanism: RelayMechanism,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum RelayMechanism {
    #[default]
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "PLAIN")]
    Plain,
    #[serde(rename = "LOGIN")]
    Login,
    #[serde(rename = "CRAM-MD5")]
    CramMd5,
}

/// One entry of the ordered storage stack.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageLayerConfig {
    Memory,
    Sqlite {
        database: PathBuf,
    },
    Filesystem {
        folder: PathBuf,
        #[serde(default)]
        format: FilesystemFormat,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemFormat {
    #[default]
    Eml,
    Mailhog,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LogConfig {
    /// Minimum level: error, warn, info, debug, trace.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
        }
    }
}

fn default_smtp_addr() -> String {
    "127.0.0.1:1025".to_owned()
}

fn default_http_addr() -> String {
    "127.0.0.1:8080".to_owned()
}

fn default_host_name() -> String {
    "mockmta.localdomain".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

pub fn load_config(path: &Path) -> Result<SystemConfig, Error> {
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config: SystemConfig = toml::from_str(
            r#"
[smtp]
addr = "0.0.0.0:1025"

[smtp.relays.upstream]
enabled = true
auto_relay = true
addr = "mail.example.com:587"
username = "u"
password = "p"
mechanism = "CRAM-MD5"

[http]
addr = "0.0.0.0:8080"

[[storage]]
type = "memory"

[[storage]]
type = "sqlite"
database = "/tmp/mta.db"

[[storage]]
type = "filesystem"
folder = "/tmp/mail"
format = "mailhog"

[log]
level = "debug"
"#,
        )
        .unwrap();

        assert_eq!("0.0.0.0:1025", config.smtp.addr);
        let relay = &config.smtp.relays["upstream"];
        assert!(relay.enabled);
        assert!(relay.auto_relay);
        assert_eq!(RelayMechanism::CramMd5, relay.mechanism);
        assert_eq!(3, config.storages.len());
        assert!(matches!(config.storages[0], StorageLayerConfig::Memory));
        assert!(matches!(
            config.storages[2],
            StorageLayerConfig::Filesystem {
                format: FilesystemFormat::Mailhog,
                ..
            }
        ));
        assert_eq!("debug", config.log.level);
    }

    #[test]
    fn parse_empty_config() {
        let config: SystemConfig = toml::from_str("").unwrap();
        assert_eq!("127.0.0.1:1025", config.smtp.addr);
        assert_eq!("127.0.0.1:8080", config.http.addr);
        assert!(config.storages.is_empty());
        assert_eq!("info", config.log.level);
    }

    #[test]
    fn relay_mechanism_defaults_to_none() {
        let config: SystemConfig = toml::from_str(
            r#"
[smtp.relays.plain]
enabled = true
addr = "localhost:25"
"#,
        )
        .unwrap();
        assert_eq!(
            RelayMechanism::None,
            config.smtp.relays["plain"].mechanism
        );
    }
}
