//! Decides which environment variables cross to the other side.
//!
//! Only a small allow-list is forwarded implicitly. Proxy variables are
//! rewritten so loopback proxies keep working across the VM boundary, and
//! anything else must be requested by name through the opt-in variable.

use crate::Direction;
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Variable name to value. Sorted so serialized forms are deterministic.
pub type EnvironmentMap = BTreeMap<String, String>;

pub const ALWAYS_PASS: &[&str] = &[
    "TERM",
    "COLORTERM",
    "TERM_PROGRAM",
    "TERM_PROGRAM_VERSION",
    "LC_TERMINAL",
    "LC_TERMINAL_VERSION",
    "DISPLAY",
];

pub const PROXY_VARS: &[&str] = &[
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "FTP_PROXY",
    "ALL_PROXY",
    "http_proxy",
    "https_proxy",
    "ftp_proxy",
    "all_proxy",
];

/// Hostnames that mean "this machine's loopback".
pub const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

pub const DEFAULT_GATEWAY_HOST: &str = "host.ferry.internal";

/// Colon-separated list of extra variable names to forward.
pub const OPT_IN_VAR: &str = "FERRYENV";
pub const LEGACY_OPT_IN_VAR: &str = "ORBENV";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProxyRewriteError {
    #[error("invalid proxy url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("proxy url has no locatable host")]
    HostNotFound,
}

/// One entry of the opt-in list, `NAME` or `NAME/FLAGS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptIn {
    pub name: String,
    /// Accepted but not interpreted yet.
    pub flags: Option<String>,
}

pub fn parse_opt_in(list: &str) -> Vec<OptIn> {
    list.split(':')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (name, flags) = match entry.split_once('/') {
                Some((name, flags)) => (name, Some(flags.to_string())),
                None => (entry, None),
            };
            if name.is_empty() {
                return None;
            }
            Some(OptIn {
                name: name.to_string(),
                flags,
            })
        })
        .collect()
}

/// The opt-in list from `source`, preferring the primary variable name.
pub fn opt_in_entries(source: &EnvironmentMap) -> Vec<OptIn> {
    source
        .get(OPT_IN_VAR)
        .or_else(|| source.get(LEGACY_OPT_IN_VAR))
        .map(|list| parse_opt_in(list))
        .unwrap_or_default()
}

/// Snapshot of the current process environment. Non-UTF-8 entries are skipped.
pub fn process_environment() -> EnvironmentMap {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFilter {
    gateway_host: String,
}

impl Default for EnvFilter {
    fn default() -> Self {
        Self::new(DEFAULT_GATEWAY_HOST)
    }
}

impl EnvFilter {
    pub fn new(gateway_host: impl Into<String>) -> Self {
        Self {
            gateway_host: gateway_host.into(),
        }
    }

    pub fn gateway_host(&self) -> &str {
        &self.gateway_host
    }

    /// Build the environment to send for a session.
    pub fn build(&self, source: &EnvironmentMap, direction: Direction) -> EnvironmentMap {
        let mut out = EnvironmentMap::new();

        for key in ALWAYS_PASS {
            if let Some(value) = source.get(*key) {
                out.insert((*key).to_string(), value.clone());
            }
        }

        for key in PROXY_VARS {
            let Some(value) = source.get(*key) else {
                continue;
            };
            match self.rewrite_proxy(value, direction) {
                Ok(rewritten) => {
                    out.insert((*key).to_string(), rewritten);
                }
                Err(err) => {
                    tracing::warn!(variable = *key, error = %err, "skipping proxy variable");
                }
            }
        }

        for entry in opt_in_entries(source) {
            if let Some(value) = source.get(&entry.name) {
                out.insert(entry.name, value.clone());
            }
        }

        out
    }

    /// Point a loopback proxy at the gateway alias (or back). Values whose
    /// host is not recognised come back byte-for-byte unchanged.
    pub fn rewrite_proxy(
        &self,
        value: &str,
        direction: Direction,
    ) -> Result<String, ProxyRewriteError> {
        let parsed = Url::parse(value)?;
        let Some(host) = parsed.host_str() else {
            return Ok(value.to_string());
        };
        let bare = host.trim_start_matches('[').trim_end_matches(']');

        let replacement = match direction {
            Direction::ToForeign if LOOPBACK_HOSTS.contains(&bare) => self.gateway_host.as_str(),
            Direction::ToLocal if bare.eq_ignore_ascii_case(&self.gateway_host) => "localhost",
            _ => return Ok(value.to_string()),
        };

        splice_host(value, replacement).ok_or(ProxyRewriteError::HostNotFound)
    }
}

/// Replace the host inside `url` without re-serializing the rest of it.
fn splice_host(url: &str, replacement: &str) -> Option<String> {
    let authority_start = url.find("://")? + 3;
    let rest = &url[authority_start..];
    let authority_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_len];

    let host_offset = authority.rfind('@').map(|at| at + 1).unwrap_or(0);
    let host_port = &authority[host_offset..];
    let host_len = if host_port.starts_with('[') {
        host_port.find(']')? + 1
    } else {
        host_port.find(':').unwrap_or(host_port.len())
    };
    if host_len == 0 {
        return None;
    }

    let host_start = authority_start + host_offset;
    let host_end = host_start + host_len;
    Some(format!(
        "{}{}{}",
        &url[..host_start],
        replacement,
        &url[host_end..]
    ))
}
