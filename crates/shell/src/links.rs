//! Command links: symlinks that make the dispatcher answer to another name.
//!
//! User-managed links live in one directory. Two further directories hold the
//! always-available links; their names are protected and can never be
//! created or removed through the registry.

use anyhow::Context;
use ferry_common::paths;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::Builder;
use thiserror::Error;

/// Always-available links placed in the default link directory.
pub const DEFAULT_LINKS: &[&str] = &["ferry", "ferryctl"];
/// Always-available links placed ahead of everything else on PATH.
pub const PRIORITY_LINKS: &[&str] = &["open"];

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid link name {0:?}: names must not contain a path separator")]
    InvalidName(String),
    #[error("{name} is already linked{}", by_default_suffix(.by_default))]
    AlreadyLinked { name: String, by_default: bool },
    #[error("{0} is a default command and cannot be unlinked")]
    Protected(String),
    #[error("{0} is not linked")]
    NotLinked(String),
    #[error("{0} exists but is not a symlink; refusing to remove it")]
    NotSymlink(String),
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn by_default_suffix(by_default: &bool) -> &'static str {
    if *by_default {
        " by default"
    } else {
        ""
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> LinkError + '_ {
    move |source| LinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct LinkRegistry {
    user_dir: PathBuf,
    default_dir: PathBuf,
    priority_dir: PathBuf,
    /// What every link points at.
    target: PathBuf,
}

impl LinkRegistry {
    pub fn new(
        user_dir: impl Into<PathBuf>,
        default_dir: impl Into<PathBuf>,
        priority_dir: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
    ) -> Self {
        Self {
            user_dir: user_dir.into(),
            default_dir: default_dir.into(),
            priority_dir: priority_dir.into(),
            target: target.into(),
        }
    }

    /// Registry under the ferry home, linking to the running executable.
    pub fn from_home() -> anyhow::Result<Self> {
        let target = std::env::current_exe().context("Failed to get current executable path")?;
        Ok(Self::new(
            paths::user_links_dir()?,
            paths::default_links_dir()?,
            paths::priority_links_dir()?,
            target,
        ))
    }

    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    /// Whether `name` belongs to one of the always-available sets.
    pub fn is_protected(&self, name: &str) -> bool {
        DEFAULT_LINKS.contains(&name)
            || PRIORITY_LINKS.contains(&name)
            || self.default_dir.join(name).symlink_metadata().is_ok()
            || self.priority_dir.join(name).symlink_metadata().is_ok()
    }

    pub fn link(&self, name: &str) -> Result<PathBuf, LinkError> {
        validate_name(name)?;
        if self.is_protected(name) {
            return Err(LinkError::AlreadyLinked {
                name: name.to_string(),
                by_default: true,
            });
        }

        let path = self.user_dir.join(name);
        if path.symlink_metadata().is_ok() {
            return Err(LinkError::AlreadyLinked {
                name: name.to_string(),
                by_default: false,
            });
        }

        fs::create_dir_all(&self.user_dir).map_err(io_err(&self.user_dir))?;
        match symlink(&self.target, &path) {
            Ok(()) => {
                tracing::debug!(name, path = %path.display(), "created command link");
                Ok(path)
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(LinkError::AlreadyLinked {
                    name: name.to_string(),
                    by_default: false,
                })
            }
            Err(err) => Err(io_err(&path)(err)),
        }
    }

    pub fn unlink(&self, name: &str) -> Result<(), LinkError> {
        validate_name(name)?;
        if self.is_protected(name) {
            return Err(LinkError::Protected(name.to_string()));
        }

        let path = self.user_dir.join(name);
        let meta = match path.symlink_metadata() {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(LinkError::NotLinked(name.to_string()));
            }
            Err(err) => return Err(io_err(&path)(err)),
        };
        if !meta.file_type().is_symlink() {
            return Err(LinkError::NotSymlink(name.to_string()));
        }

        fs::remove_file(&path).map_err(io_err(&path))?;
        tracing::debug!(name, "removed command link");
        Ok(())
    }

    /// User-managed link names, sorted.
    pub fn list(&self) -> Result<Vec<String>, LinkError> {
        let entries = match fs::read_dir(&self.user_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_err(&self.user_dir)(err)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_err(&self.user_dir))?;
            let is_link = entry
                .file_type()
                .map(|ft| ft.is_symlink())
                .unwrap_or(false);
            if is_link {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// (Re)create both always-available link directories. Each directory is
    /// built next to its final location and renamed into place.
    pub fn install_defaults(&self) -> Result<(), LinkError> {
        install_set(&self.default_dir, DEFAULT_LINKS, &self.target)?;
        install_set(&self.priority_dir, PRIORITY_LINKS, &self.target)
    }
}

fn validate_name(name: &str) -> Result<(), LinkError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains(std::path::MAIN_SEPARATOR)
    {
        return Err(LinkError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn install_set(dir: &Path, names: &[&str], target: &Path) -> Result<(), LinkError> {
    let parent = dir.parent().unwrap_or(Path::new("/"));
    fs::create_dir_all(parent).map_err(io_err(parent))?;

    let temp_dir = Builder::new()
        .prefix(".ferry-links-")
        .tempdir_in(parent)
        .map_err(io_err(parent))?;
    for name in names {
        let link = temp_dir.path().join(name);
        symlink(target, &link).map_err(io_err(&link))?;
    }

    if dir.exists() {
        fs::remove_dir_all(dir).map_err(io_err(dir))?;
    }
    fs::rename(temp_dir.path(), dir).map_err(io_err(dir))?;
    tracing::debug!(dir = %dir.display(), count = names.len(), "installed default links");
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "command links require a unix host",
    ))
}
