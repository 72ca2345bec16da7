//! Path translation between the local and foreign mount namespaces.

use crate::Direction;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `-flag=/value`, `--flag=/value` or `flag=/value`.
static PATH_ARG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-*)([a-zA-Z0-9_\-]*)=(/.+)$").expect("path argument pattern is valid")
});

pub const DEFAULT_LINKED_PREFIXES: &[&str] = &["/Users", "/Volumes", "/private", "/tmp", "/var/folders"];
pub const DEFAULT_MOUNT_PREFIX: &str = "/mnt/mac";
pub const DEFAULT_EXPLICIT_PREFIX: &str = "/mnt/linux";
pub const DEFAULT_FOREIGN_ROOT: &str = "/";

/// How eagerly absolute paths are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationMode {
    /// Only paths under the home directory are rewritten.
    #[default]
    Relaxed,
    /// Every absolute path outside the linked set is rewritten.
    Aggressive,
}

impl TranslationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relaxed => "relaxed",
            Self::Aggressive => "aggressive",
        }
    }
}

impl FromStr for TranslationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "relaxed" => Ok(Self::Relaxed),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(format!("invalid translation mode: {}", other)),
        }
    }
}

impl fmt::Display for TranslationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to translate a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathContext {
    /// Prefixes that name the same files on both sides.
    pub linked: Vec<String>,
    /// Where the foreign side sees this machine's filesystem.
    pub mount_prefix: String,
    /// Prefix a user writes to say "this path is already foreign".
    pub explicit_prefix: String,
    /// Where explicitly foreign paths are rooted.
    pub foreign_root: String,
    /// Parent of the per-container NFS exports, e.g. `/Users/me/Linux`.
    pub nfs_root: Option<String>,
    pub target_container: Option<String>,
    pub home: Option<String>,
    pub cwd: Option<String>,
    pub mode: TranslationMode,
}

impl Default for PathContext {
    fn default() -> Self {
        Self {
            linked: DEFAULT_LINKED_PREFIXES.iter().map(|s| s.to_string()).collect(),
            mount_prefix: DEFAULT_MOUNT_PREFIX.to_string(),
            explicit_prefix: DEFAULT_EXPLICIT_PREFIX.to_string(),
            foreign_root: DEFAULT_FOREIGN_ROOT.to_string(),
            nfs_root: None,
            target_container: None,
            home: None,
            cwd: None,
            mode: TranslationMode::default(),
        }
    }
}

impl PathContext {
    pub fn translate(&self, path: &str, direction: Direction) -> String {
        match direction {
            Direction::ToForeign => self.to_foreign(path),
            Direction::ToLocal => self.to_local(path),
        }
    }

    /// Map a path on this machine to the name the foreign side uses for it.
    pub fn to_foreign(&self, path: &str) -> String {
        let p = clean_path(path);
        if !p.starts_with('/') {
            return p;
        }
        if self.is_linked(&p) {
            return p;
        }
        if let Some(rest) = strip_prefix_dir(&p, &self.explicit_prefix) {
            return join_under(&self.foreign_root, rest);
        }
        if is_under(&p, &self.mount_prefix) {
            return p;
        }

        match self.mode {
            TranslationMode::Relaxed => match self.home.as_deref() {
                Some(home) if is_under(&p, &clean_path(home)) => join_under(&self.mount_prefix, &p),
                _ => p,
            },
            TranslationMode::Aggressive => join_under(&self.mount_prefix, &p),
        }
    }

    /// Map a path (possibly relative, possibly pointing into a container's
    /// NFS export) onto the mount namespace used by the session.
    pub fn to_local(&self, path: &str) -> String {
        let mut p = clean_path(path);
        if !p.starts_with('/') {
            match self.cwd.as_deref() {
                Some(cwd) => p = clean_path(&format!("{cwd}/{p}")),
                None => return p,
            }
        }

        if let (Some(root), Some(container)) = (&self.nfs_root, &self.target_container) {
            let export = clean_path(&format!("{root}/{container}"));
            if let Some(rest) = strip_prefix_dir(&p, &export) {
                return rest.to_string();
            }
        }
        if self.is_linked(&p) {
            return p;
        }
        if is_under(&p, &self.mount_prefix) {
            return p;
        }
        join_under(&self.mount_prefix, &p)
    }

    /// Translate every path-shaped argument, leaving flag names intact.
    pub fn translate_args(&self, args: &[String], direction: Direction) -> Vec<String> {
        args.iter()
            .map(|arg| match split_path_arg(arg) {
                Some(parts) => format!(
                    "{}{}={}",
                    parts.dashes,
                    parts.name,
                    self.translate(parts.value, direction)
                ),
                None if arg.starts_with('/') => self.translate(arg, direction),
                None => arg.clone(),
            })
            .collect()
    }

    fn is_linked(&self, path: &str) -> bool {
        self.linked.iter().any(|prefix| is_under(path, prefix))
    }
}

/// Pieces of a `--flag=/value` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathArg<'a> {
    pub dashes: &'a str,
    pub name: &'a str,
    pub value: &'a str,
}

pub fn split_path_arg(arg: &str) -> Option<PathArg<'_>> {
    let caps = PATH_ARG_RE.captures(arg)?;
    Some(PathArg {
        dashes: caps.get(1).map_or("", |m| m.as_str()),
        name: caps.get(2).map_or("", |m| m.as_str()),
        value: caps.get(3)?.as_str(),
    })
}

/// Whether `arg` is an absolute path or a `name=/path` pair.
pub fn is_path_arg(arg: &str) -> bool {
    arg.starts_with('/') || PATH_ARG_RE.is_match(arg)
}

/// Lexically clean a slash-separated path: collapse separators, drop `.`,
/// resolve `..` where possible.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

fn is_under(path: &str, prefix: &str) -> bool {
    strip_prefix_dir(path, prefix).is_some()
}

/// `path` relative to `prefix` as an absolute remainder (`/` when equal).
fn strip_prefix_dir<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path.starts_with('/').then_some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn join_under(root: &str, absolute: &str) -> String {
    let root = root.trim_end_matches('/');
    if absolute == "/" {
        return if root.is_empty() { "/".to_string() } else { root.to_string() };
    }
    format!("{root}{absolute}")
}
