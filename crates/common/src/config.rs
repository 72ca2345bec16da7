//! `config.toml` loading and the transport endpoint.

use crate::env_filter::{EnvFilter, DEFAULT_GATEWAY_HOST};
use crate::path_translate::{
    PathContext, TranslationMode, DEFAULT_EXPLICIT_PREFIX, DEFAULT_FOREIGN_ROOT,
    DEFAULT_LINKED_PREFIXES, DEFAULT_MOUNT_PREFIX,
};
use crate::paths;
use crate::session_user::{SessionUser, DEFAULT_CONTAINER, DEFAULT_USER_MARKER};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Overrides `[transport] endpoint`.
pub const ENDPOINT_VAR: &str = "FERRY_ENDPOINT";

const DEFAULT_START_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("endpoint is empty")]
    Empty,
    #[error("endpoint {0:?} is neither a socket path nor host:port")]
    Unrecognized(String),
    #[error("endpoint {0:?} has an invalid port")]
    InvalidPort(String),
}

/// Where the remote session server is listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    /// `host:port`
    Tcp(String),
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err(EndpointError::Empty);
        }
        if let Some(path) = value.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(EndpointError::Empty);
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if value.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(value)));
        }

        let addr = value.strip_prefix("tcp:").unwrap_or(value);
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::Unrecognized(value.to_string()))?;
        if host.is_empty() {
            return Err(EndpointError::Unrecognized(value.to_string()));
        }
        port.parse::<u16>()
            .map_err(|_| EndpointError::InvalidPort(value.to_string()))?;
        Ok(Self::Tcp(addr.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSettings {
    pub endpoint: Option<String>,
    /// How long the readiness probe waits for the endpoint to appear.
    pub start_timeout_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            start_timeout_ms: DEFAULT_START_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    pub user: String,
    pub container: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            user: DEFAULT_USER_MARKER.to_string(),
            container: DEFAULT_CONTAINER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    pub mode: TranslationMode,
    pub linked: Vec<String>,
    pub mount_prefix: String,
    pub explicit_prefix: String,
    pub foreign_root: String,
    /// Defaults to `<home>/Linux`.
    pub nfs_root: Option<String>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            mode: TranslationMode::default(),
            linked: DEFAULT_LINKED_PREFIXES.iter().map(|s| s.to_string()).collect(),
            mount_prefix: DEFAULT_MOUNT_PREFIX.to_string(),
            explicit_prefix: DEFAULT_EXPLICIT_PREFIX.to_string(),
            foreign_root: DEFAULT_FOREIGN_ROOT.to_string(),
            nfs_root: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvSettings {
    pub gateway_host: String,
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            gateway_host: DEFAULT_GATEWAY_HOST.to_string(),
        }
    }
}

/// Process-wide relay configuration, loaded once and passed by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub transport: TransportSettings,
    pub session: SessionSettings,
    pub paths: PathSettings,
    pub env: EnvSettings,
}

impl RelayConfig {
    /// Load `$FERRY_HOME/config.toml` (missing file means defaults) and apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = paths::config_file()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(path, &contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(anyhow!("failed to read {}: {err}", path.display())),
        }
    }

    pub fn parse(path: &Path, contents: &str) -> Result<Self> {
        toml::from_str(contents).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var(ENDPOINT_VAR) {
            let trimmed = endpoint.trim();
            if !trimmed.is_empty() {
                self.transport.endpoint = Some(trimmed.to_string());
            }
        }
    }

    /// The configured endpoint, or the agent socket under the ferry home.
    pub fn endpoint(&self) -> Result<Endpoint> {
        match self.transport.endpoint.as_deref() {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid transport endpoint {raw:?}")),
            None => Ok(Endpoint::Unix(paths::agent_socket()?)),
        }
    }

    pub fn session_user(&self) -> SessionUser {
        SessionUser::parse(&format!("{}@{}", self.session.user, self.session.container))
    }

    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::new(self.env.gateway_host.clone())
    }

    /// Translation context for this process, seen from `cwd`.
    pub fn path_context(&self, target_container: Option<&str>) -> PathContext {
        let home = dirs::home_dir().map(|home| home.to_string_lossy().into_owned());
        let nfs_root = self
            .paths
            .nfs_root
            .clone()
            .or_else(|| home.as_ref().map(|home| format!("{home}/Linux")));
        PathContext {
            linked: self.paths.linked.clone(),
            mount_prefix: self.paths.mount_prefix.clone(),
            explicit_prefix: self.paths.explicit_prefix.clone(),
            foreign_root: self.paths.foreign_root.clone(),
            nfs_root,
            target_container: target_container.map(str::to_string),
            home,
            cwd: std::env::current_dir()
                .ok()
                .map(|cwd| cwd.to_string_lossy().into_owned()),
            mode: self.paths.mode,
        }
    }
}
