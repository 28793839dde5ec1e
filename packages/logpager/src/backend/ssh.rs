//! SSH/SFTP session setup for remote targets.
//!
//! Password authentication with the secret read from an environment variable,
//! and host keys checked against an OpenSSH `known_hosts` file.

use std::fmt;
use std::net::TcpStream;
use std::path::PathBuf;

use ssh2::{CheckResult, KnownHostFileKind, Session, Sftp};
use tracing::{info, warn};

use crate::config::SshConfig;
use crate::error::BackendError;

/// Where to reach the SSH server and who to log in as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshTarget {
    pub user: String,
    pub host: String,
    /// Overrides the configured default port.
    pub port: Option<u16>,
}

impl fmt::Display for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}@{}:{}", self.user, self.host, port),
            None => write!(f, "{}@{}", self.user, self.host),
        }
    }
}

/// Connect, verify the host key, authenticate, and open the SFTP subsystem.
pub async fn connect(target: SshTarget, config: SshConfig) -> Result<Sftp, BackendError> {
    tokio::task::spawn_blocking(move || connect_blocking(&target, &config)).await?
}

fn connect_blocking(target: &SshTarget, config: &SshConfig) -> Result<Sftp, BackendError> {
    let password = std::env::var(&config.password_env)
        .ok()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| BackendError::MissingCredentials {
            var: config.password_env.clone(),
            user: target.user.clone(),
            host: target.host.clone(),
        })?;

    let port = target.port.unwrap_or(config.port);
    let tcp = TcpStream::connect((target.host.as_str(), port))?;

    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session.handshake()?;

    verify_host_key(&session, &target.host, port, config)?;

    session.userauth_password(&target.user, &password)?;
    if !session.authenticated() {
        return Err(BackendError::AuthFailed {
            user: target.user.clone(),
            host: target.host.clone(),
        });
    }
    info!(
        "SSH session established to {}@{}:{}",
        target.user, target.host, port
    );

    Ok(session.sftp()?)
}

fn known_hosts_path(config: &SshConfig) -> Option<PathBuf> {
    match &config.known_hosts {
        Some(path) => match path.strip_prefix("~") {
            Ok(rest) => dirs::home_dir().map(|home| home.join(rest)),
            Err(_) => Some(path.clone()),
        },
        None => dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts")),
    }
}

fn verify_host_key(
    session: &Session,
    host: &str,
    port: u16,
    config: &SshConfig,
) -> Result<(), BackendError> {
    let reject = |reason: String| BackendError::HostKey {
        host: host.to_string(),
        reason,
    };

    let (key, _) = session
        .host_key()
        .ok_or_else(|| reject("server sent no host key".into()))?;

    let mut known_hosts = session.known_hosts()?;
    if let Some(path) = known_hosts_path(config).filter(|p| p.exists()) {
        known_hosts.read_file(&path, KnownHostFileKind::OpenSSH)?;
    }

    match known_hosts.check_port(host, port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::Mismatch => Err(reject("key does not match known_hosts entry".into())),
        CheckResult::NotFound if !config.strict_host_key_checking => {
            warn!(
                "Accepting unknown host key for {}:{} (strict_host_key_checking = false)",
                host, port
            );
            Ok(())
        }
        CheckResult::NotFound => Err(reject("host not present in known_hosts".into())),
        CheckResult::Failure => Err(reject("known_hosts lookup failed".into())),
    }
}
