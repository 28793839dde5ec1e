use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// File config (figment-deserialized from defaults / logpager.toml / env vars)
// =============================================================================
//
//   logpager.toml:   [session]
//                    page_size = 4096
//
//   env var:         LOGPAGER_SESSION__PAGE_SIZE=4096   (double underscore = nesting)

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "logpager.toml";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
    #[serde(default)]
    pub ssh: SshConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Per-connection tunables (lives under `[session]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    /// Close sessions that send nothing for this long. 0 disables.
    #[serde(default)]
    pub idle_timeout_secs: u64,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            write_timeout_secs: default_write_timeout_secs(),
            idle_timeout_secs: 0,
        }
    }
}

/// Remote target settings (lives under `[ssh]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Name of the environment variable holding the SSH password.
    #[serde(default = "default_password_env")]
    pub password_env: String,
    /// Defaults to `~/.ssh/known_hosts`.
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
    #[serde(default = "default_strict_host_key_checking")]
    pub strict_host_key_checking: bool,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            port: default_ssh_port(),
            password_env: default_password_env(),
            known_hosts: None,
            strict_host_key_checking: default_strict_host_key_checking(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_page_size() -> usize {
    8192
}
fn default_write_timeout_secs() -> u64 {
    20
}
fn default_ssh_port() -> u16 {
    22
}
fn default_password_env() -> String {
    "SSH_PASSWORD".to_string()
}
fn default_strict_host_key_checking() -> bool {
    true
}

/// Build a figment that layers: defaults → config file → LOGPAGER_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `LOGPAGER_SERVER__PORT=9000`  →  `server.port = 9000`
pub fn load_config(config_file: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed("LOGPAGER_").split("__"))
}

/// Values given on the command line. They sit above every figment layer.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub page_size: Option<usize>,
}

// =============================================================================
// Runtime config (derived from FileConfig, used throughout the server)
// =============================================================================

/// Settings every session is created with.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Bytes read per scroll step
    pub page_size: usize,
    /// Deadline for a single outbound frame
    pub write_timeout: Duration,
    /// End the session after this long without a client command
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_file(&SessionFileConfig::default())
    }
}

impl SessionConfig {
    pub fn from_file(fc: &SessionFileConfig) -> Self {
        Self {
            page_size: fc.page_size,
            write_timeout: Duration::from_secs(fc.write_timeout_secs),
            idle_timeout: if fc.idle_timeout_secs == 0 {
                None
            } else {
                Some(Duration::from_secs(fc.idle_timeout_secs))
            },
        }
    }
}

/// Fully resolved configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub session: SessionConfig,
    pub ssh: SshConfig,
}

impl Config {
    /// Resolve the layered figment plus CLI overrides into runtime config.
    pub fn load(config_file: &Path, overrides: CliOverrides) -> Result<Self> {
        let mut fc: FileConfig = load_config(config_file)
            .extract()
            .with_context(|| format!("Failed to load configuration from {:?}", config_file))?;

        if let Some(host) = overrides.host {
            fc.server.host = host;
        }
        if let Some(port) = overrides.port {
            fc.server.port = port;
        }
        if let Some(page_size) = overrides.page_size {
            fc.session.page_size = page_size;
        }

        Self::from_file(fc)
    }

    pub fn from_file(fc: FileConfig) -> Result<Self> {
        if fc.session.page_size == 0 {
            bail!("session.page_size must be greater than 0");
        }
        if fc.session.write_timeout_secs == 0 {
            bail!("session.write_timeout_secs must be greater than 0");
        }

        let listen_addr = format!("{}:{}", fc.server.host, fc.server.port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address {}:{}", fc.server.host, fc.server.port))?;

        Ok(Self {
            listen_addr,
            session: SessionConfig::from_file(&fc.session),
            ssh: fc.ssh,
        })
    }
}
