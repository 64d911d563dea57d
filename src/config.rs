//! Configuration module for vsock-relay.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Bind to any context id (`VMADDR_CID_ANY`).
pub const CID_ANY: u32 = u32::MAX;

/// Command-line arguments for the relay
#[derive(Parser, Debug)]
#[command(name = "vsock-relay")]
#[command(author = "vsock-relay authors")]
#[command(version = "0.1.0")]
#[command(
    about = "Relay stdin/stdout over a single accepted vsock connection",
    long_about = None
)]
pub struct CliArgs {
    /// Port to listen on
    pub port: Option<u32>,

    /// Write data received on the connection back to it instead of stdout
    #[arg(long)]
    pub echo: bool,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address family of the listening socket
    #[arg(long, value_enum)]
    pub transport: Option<Transport>,

    /// vsock context id to bind (defaults to any)
    #[arg(long)]
    pub cid: Option<u32>,

    /// Host to bind when using the tcp transport
    #[arg(long)]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Address family used for the listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// AF_VSOCK stream socket
    #[default]
    Vsock,
    /// TCP stream socket
    Tcp,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener-related configuration
#[derive(Debug, Deserialize)]
pub struct ListenerConfig {
    #[serde(default)]
    pub transport: Transport,
    pub port: Option<u32>,
    #[serde(default = "default_cid")]
    pub cid: u32,
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            port: None,
            cid: default_cid(),
            host: default_host(),
        }
    }
}

/// Relay-related configuration
#[derive(Debug, Deserialize, Default)]
pub struct RelayConfig {
    /// Echo connection data back instead of writing it to stdout
    #[serde(default)]
    pub echo: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_cid() -> u32 {
    CID_ANY
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

// stderr stays quiet on a successful run
fn default_log_level() -> String {
    "warn".to_string()
}

/// Where the single connection is accepted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenAddr {
    Vsock { cid: u32, port: u32 },
    Tcp(SocketAddr),
}

impl std::fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenAddr::Vsock { cid, port } if *cid == CID_ANY => write!(f, "vsock:any:{port}"),
            ListenAddr::Vsock { cid, port } => write!(f, "vsock:{cid}:{port}"),
            ListenAddr::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: ListenAddr,
    pub echo: bool,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listener = toml_config.listener;
        let port = cli.port.or(listener.port).ok_or(ConfigError::MissingPort)?;

        let listen = match cli.transport.unwrap_or(listener.transport) {
            Transport::Vsock => ListenAddr::Vsock {
                cid: cli.cid.unwrap_or(listener.cid),
                port,
            },
            Transport::Tcp => {
                let host = cli.host.unwrap_or(listener.host);
                let ip: IpAddr = host
                    .parse()
                    .map_err(|_| ConfigError::InvalidHost(host.clone()))?;
                let port = u16::try_from(port).map_err(|_| ConfigError::PortRange(port))?;
                ListenAddr::Tcp(SocketAddr::new(ip, port))
            }
        };

        Ok(Config {
            listen,
            echo: cli.echo || toml_config.relay.echo,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    MissingPort,
    InvalidHost(String),
    PortRange(u32),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::MissingPort => {
                write!(f, "No port given on the command line or in the config file")
            }
            ConfigError::InvalidHost(host) => write!(f, "Invalid bind host '{}'", host),
            ConfigError::PortRange(port) => write!(f, "Port {} is out of range for tcp", port),
        }
    }
}

impl std::error::Error for ConfigError {}
