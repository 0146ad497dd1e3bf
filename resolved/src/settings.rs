//! Configuration loading (spec §6's "Config file" section). INI format,
//! single unnamed section, loaded the way the teacher loads its own YAML
//! settings (`config::Config::builder().add_source(...).build()?.try_deserialize()`),
//! with the `ini` feature substituted for `yaml`. Field names and defaults
//! are grounded on `examples/original_source/cmd/config/config.go`'s
//! `AppConfig`/`LoadINIConfig`.

use std::fmt;
use std::time::Duration;

use config::{Config, File};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Err,
    Vpn,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// Mirrors the Go source's `AppConfig`: `auto-subscribe`, `update-period`,
/// `check-openvpn`, `log-level`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "auto-subscribe", default)]
    pub auto_subscribe: bool,

    #[serde(rename = "update-period", default = "default_update_period")]
    pub update_period: HumanDuration,

    #[serde(rename = "check-openvpn", default = "default_true")]
    pub check_openvpn: bool,

    #[serde(rename = "log-level", default)]
    pub log_level: LogLevel,
}

fn default_true() -> bool {
    true
}

fn default_update_period() -> HumanDuration {
    HumanDuration(Duration::from_secs(30 * 60))
}

/// A `Duration` parsed from a humantime-style string (`"30m"`, `"1h"`),
/// since the INI value is plain text and `config` does not know how to
/// deserialise a bare string into `std::time::Duration` on its own.
#[derive(Debug, Clone, Copy)]
pub struct HumanDuration(pub Duration);

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw)
            .map(HumanDuration)
            .map_err(serde::de::Error::custom)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auto_subscribe: false,
            update_period: default_update_period(),
            check_openvpn: true,
            log_level: LogLevel::Info,
        }
    }
}

pub fn load(path: &str) -> Result<AppConfig, Error> {
    let settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(Error::Load)?;
    settings.try_deserialize().map_err(Error::Load)
}

#[derive(Debug)]
pub enum Error {
    Load(config::ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Load(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Load(err) => Some(err),
        }
    }
}
