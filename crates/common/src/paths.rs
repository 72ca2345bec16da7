use anyhow::Result;
use std::path::PathBuf;

pub const FERRY_DIR_NAME: &str = ".ferry";
pub const FERRY_HOME_VAR: &str = "FERRY_HOME";
pub const USER_LINKS_SUBDIR: &str = "links";
pub const DEFAULT_LINKS_SUBDIR: &str = "bin";
pub const PRIORITY_LINKS_SUBDIR: &str = "bin-priority";
pub const AGENT_SOCKET_NAME: &str = "agent.sock";

pub fn ferry_home() -> Result<PathBuf> {
    if let Ok(override_home) = std::env::var(FERRY_HOME_VAR) {
        let trimmed = override_home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("No home directory found"))?
        .join(FERRY_DIR_NAME))
}

/// Directory holding user-managed command links.
pub fn user_links_dir() -> Result<PathBuf> {
    Ok(ferry_home()?.join(USER_LINKS_SUBDIR))
}

/// Directory holding the always-available command links.
pub fn default_links_dir() -> Result<PathBuf> {
    Ok(ferry_home()?.join(DEFAULT_LINKS_SUBDIR))
}

/// Always-available links that sit ahead of everything else on PATH.
pub fn priority_links_dir() -> Result<PathBuf> {
    Ok(ferry_home()?.join(PRIORITY_LINKS_SUBDIR))
}

pub fn config_file() -> Result<PathBuf> {
    Ok(ferry_home()?.join("config.toml"))
}

pub fn agent_socket() -> Result<PathBuf> {
    Ok(ferry_home()?.join(AGENT_SOCKET_NAME))
}
