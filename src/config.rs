use std::fs::read_to_string;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;

use session::ProtocolVersion;

/// Which wire framing a connection speaks. Mirrors `session::ProtocolVersion`
/// but is its own type so config files describe it with a plain integer.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfiguredVersion {
    V1,
    V2,
}

impl Default for ConfiguredVersion {
    fn default() -> Self {
        Self::V2
    }
}

impl From<ConfiguredVersion> for ProtocolVersion {
    fn from(v: ConfiguredVersion) -> Self {
        match v {
            ConfiguredVersion::V1 => ProtocolVersion::V1,
            ConfiguredVersion::V2 => ProtocolVersion::V2,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

/// Drives the demo binary and integration tests against a real RCON server.
/// Not a network-facing surface of the protocol engine itself.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct RconConfig {
    pub host: String,
    #[serde(default = "RconConfig::port")]
    pub port: u16,
    pub password: String,
    #[serde(default)]
    pub version: ConfiguredVersion,
    #[serde(default = "RconConfig::max_workers")]
    pub max_workers: usize,
    #[serde(default = "RconConfig::connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "RconConfig::request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub allow_concurrent_requests: bool,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
}

impl RconConfig {
    fn port() -> u16 {
        28960
    }

    fn max_workers() -> usize {
        4
    }

    fn connect_timeout_secs() -> u64 {
        10
    }

    fn request_timeout_secs() -> u64 {
        10
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(serde_json5::from_str(&read_to_string(path)?)?)
    }
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
pub struct Cli {
    /// Path to a JSON5 config file describing host/port/password.
    #[arg(long, short)]
    pub config: String,
}

impl Cli {
    pub fn load_config() -> Result<RconConfig> {
        RconConfig::load_from_file(Cli::parse().config)
    }
}
