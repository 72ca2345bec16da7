//! Per-channel request state and launch resolution.
//!
//! Everything the client sends ahead of the start request (environment, the
//! metadata carrier, the PTY request) is collected here, then folded into a
//! [`LaunchSpec`] once the start request arrives.

use ferry_common::termios::{PortableModes, WindowSize};
use ferry_common::{CommandMode, MetadataError, SessionMetadata, META_ENV_KEY};
use std::path::{Path, PathBuf};
use thiserror::Error;

const FALLBACK_SHELL: &str = "/bin/sh";
const FALLBACK_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

#[derive(Debug, Error)]
pub enum ArgvError {
    #[error("command payload is not a JSON string array: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("command payload is an empty argument list")]
    Empty,
    #[error("command payload is not valid UTF-8")]
    NotUtf8,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Argv(#[from] ArgvError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    pub term: String,
    pub size: WindowSize,
    pub modes: PortableModes,
}

/// Which child streams are wired to the PTY rather than a pipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PtyStreams {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
}

impl PtyStreams {
    pub fn any(&self) -> bool {
        self.stdin || self.stdout || self.stderr
    }
}

/// Facts about the agent's own host used to fill in defaults.
#[derive(Debug, Clone)]
pub struct HostDefaults {
    pub shell: String,
    pub home: Option<PathBuf>,
    pub path: String,
    pub user: Option<String>,
}

impl HostDefaults {
    pub fn detect() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            shell: var("SHELL").unwrap_or_else(|| FALLBACK_SHELL.to_string()),
            home: dirs::home_dir(),
            path: var("PATH").unwrap_or_else(|| FALLBACK_PATH.to_string()),
            user: var("USER").or_else(|| var("LOGNAME")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub argv0: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Complete child environment; nothing else is inherited.
    pub env: Vec<(String, String)>,
    pub pty: Option<PtyRequest>,
    pub streams: PtyStreams,
}

#[derive(Debug, Default)]
pub struct ChannelRequest {
    env: Vec<(String, String)>,
    metadata: Option<String>,
    pty: Option<PtyRequest>,
}

impl ChannelRequest {
    pub fn set_env(&mut self, name: &str, value: &str) {
        if name == META_ENV_KEY {
            self.metadata = Some(value.to_string());
        } else {
            self.env.push((name.to_string(), value.to_string()));
        }
    }

    pub fn set_pty(&mut self, pty: PtyRequest) {
        self.pty = Some(pty);
    }

    pub fn pty(&self) -> Option<&PtyRequest> {
        self.pty.as_ref()
    }

    /// Decoded metadata. A client that sent none (a plain `ssh`) but asked
    /// for a PTY gets a PTY on every stream.
    pub fn metadata(&self) -> Result<SessionMetadata, MetadataError> {
        match &self.metadata {
            Some(raw) => SessionMetadata::decode(raw),
            None if self.pty.is_some() => Ok(SessionMetadata::default().with_all_pty()),
            None => Ok(SessionMetadata::default()),
        }
    }

    /// Resolve a start request. `payload` is `None` for a shell request.
    pub fn launch(
        &self,
        payload: Option<&[u8]>,
        host: &HostDefaults,
    ) -> Result<LaunchSpec, LaunchError> {
        let meta = self.metadata()?;
        let streams = match self.pty {
            Some(_) => PtyStreams {
                stdin: meta.pty_stdin,
                stdout: meta.pty_stdout,
                stderr: meta.pty_stderr,
            },
            None => PtyStreams::default(),
        };

        let (program, default_argv0, args) = match (meta.mode, payload) {
            (CommandMode::RawArgv, Some(payload)) => {
                let mut argv = parse_argv(payload)?;
                let program = argv.remove(0);
                (program.clone(), program, argv)
            }
            (_, payload) => {
                let login_name = format!("-{}", basename(&host.shell));
                let args = match payload {
                    Some(payload) => {
                        let command =
                            std::str::from_utf8(payload).map_err(|_| ArgvError::NotUtf8)?;
                        vec!["-c".to_string(), command.to_string()]
                    }
                    None => Vec::new(),
                };
                (host.shell.clone(), login_name, args)
            }
        };
        let argv0 = meta.argv0.clone().unwrap_or(default_argv0);

        let cwd = [
            (!meta.pwd.is_empty()).then(|| PathBuf::from(&meta.pwd)),
            host.home.clone(),
        ]
        .into_iter()
        .flatten()
        .find(|dir| dir.is_dir())
        .unwrap_or_else(|| PathBuf::from("/"));

        let mut env = base_env(host);
        for (key, value) in &self.env {
            upsert(&mut env, key, value);
        }
        upsert(&mut env, "PWD", &cwd.to_string_lossy());
        if let Some(pty) = &self.pty {
            upsert(&mut env, "TERM", &pty.term);
        }

        Ok(LaunchSpec {
            program,
            argv0,
            args,
            cwd,
            env,
            pty: if streams.any() { self.pty.clone() } else { None },
            streams,
        })
    }
}

/// A raw-argv payload: a non-empty JSON array of strings.
pub fn parse_argv(payload: &[u8]) -> Result<Vec<String>, ArgvError> {
    let argv: Vec<String> = serde_json::from_slice(payload).map_err(ArgvError::Malformed)?;
    if argv.is_empty() {
        return Err(ArgvError::Empty);
    }
    Ok(argv)
}

fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

fn base_env(host: &HostDefaults) -> Vec<(String, String)> {
    let mut env = vec![
        ("PATH".to_string(), host.path.clone()),
        ("SHELL".to_string(), host.shell.clone()),
    ];
    if let Some(home) = &host.home {
        env.push(("HOME".to_string(), home.to_string_lossy().into_owned()));
    }
    if let Some(user) = &host.user {
        env.push(("USER".to_string(), user.clone()));
        env.push(("LOGNAME".to_string(), user.clone()));
    }
    env
}

fn upsert(env: &mut Vec<(String, String)>, key: &str, value: &str) {
    match env.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value.to_string(),
        None => env.push((key.to_string(), value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn host(home: Option<PathBuf>) -> HostDefaults {
        HostDefaults {
            shell: "/bin/bash".into(),
            home,
            path: "/usr/bin:/bin".into(),
            user: Some("dev".into()),
        }
    }

    fn pty() -> PtyRequest {
        PtyRequest {
            term: "xterm-256color".into(),
            size: WindowSize::new(80, 24),
            modes: PortableModes::new(),
        }
    }

    fn lookup<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
        env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn raw_argv_runs_first_element() {
        let temp = TempDir::new().unwrap();
        let mut req = ChannelRequest::default();
        let meta = SessionMetadata {
            pwd: temp.path().to_string_lossy().into_owned(),
            mode: CommandMode::RawArgv,
            ..Default::default()
        };
        req.set_env(META_ENV_KEY, &meta.encode().unwrap());
        req.set_env("FOO", "bar");

        let spec = req.launch(Some(br#"["echo","hello"]"#), &host(None)).unwrap();
        assert_eq!(spec.program, "echo");
        assert_eq!(spec.argv0, "echo");
        assert_eq!(spec.args, vec!["hello"]);
        assert_eq!(spec.cwd, temp.path());
        assert_eq!(lookup(&spec.env, "FOO"), Some("bar"));
        assert_eq!(lookup(&spec.env, "PWD"), Some(&*temp.path().to_string_lossy()));
        assert_eq!(lookup(&spec.env, META_ENV_KEY), None);
        assert!(spec.pty.is_none());
    }

    #[test]
    fn metadata_argv0_overrides() {
        let mut req = ChannelRequest::default();
        let meta = SessionMetadata {
            mode: CommandMode::RawArgv,
            argv0: Some("-zsh".into()),
            ..Default::default()
        };
        req.set_env(META_ENV_KEY, &meta.encode().unwrap());
        let spec = req.launch(Some(br#"["/bin/zsh"]"#), &host(None)).unwrap();
        assert_eq!(spec.program, "/bin/zsh");
        assert_eq!(spec.argv0, "-zsh");
        assert!(spec.args.is_empty());
    }

    #[test]
    fn shell_mode_uses_login_shell() {
        let req = ChannelRequest::default();
        let spec = req.launch(Some(b"ls -la | wc -l"), &host(None)).unwrap();
        assert_eq!(spec.program, "/bin/bash");
        assert_eq!(spec.argv0, "-bash");
        assert_eq!(spec.args, vec!["-c", "ls -la | wc -l"]);

        let shell = req.launch(None, &host(None)).unwrap();
        assert!(shell.args.is_empty());
        assert_eq!(shell.cwd, PathBuf::from("/"));
    }

    #[test]
    fn bad_payloads_are_rejected() {
        let mut req = ChannelRequest::default();
        let meta = SessionMetadata {
            mode: CommandMode::RawArgv,
            ..Default::default()
        };
        req.set_env(META_ENV_KEY, &meta.encode().unwrap());
        assert!(matches!(
            req.launch(Some(b"[]"), &host(None)),
            Err(LaunchError::Argv(ArgvError::Empty))
        ));
        assert!(matches!(
            req.launch(Some(b"echo hi"), &host(None)),
            Err(LaunchError::Argv(ArgvError::Malformed(_)))
        ));
    }

    #[test]
    fn malformed_metadata_is_an_error() {
        let mut req = ChannelRequest::default();
        req.set_env(META_ENV_KEY, "{not json");
        assert!(matches!(
            req.launch(None, &host(None)),
            Err(LaunchError::Metadata(MetadataError::Malformed(_)))
        ));
    }

    #[test]
    fn missing_metadata_with_pty_is_fully_interactive() {
        let mut req = ChannelRequest::default();
        req.set_pty(pty());
        let spec = req.launch(None, &host(None)).unwrap();
        assert_eq!(
            spec.streams,
            PtyStreams {
                stdin: true,
                stdout: true,
                stderr: true
            }
        );
        assert_eq!(lookup(&spec.env, "TERM"), Some("xterm-256color"));
        assert!(spec.pty.is_some());
    }

    #[test]
    fn per_stream_flags_follow_metadata() {
        let mut req = ChannelRequest::default();
        req.set_pty(pty());
        let meta = SessionMetadata {
            pty_stdin: true,
            pty_stdout: true,
            pty_stderr: false,
            ..Default::default()
        };
        req.set_env(META_ENV_KEY, &meta.encode().unwrap());
        let spec = req.launch(None, &host(None)).unwrap();
        assert!(spec.streams.stdin && spec.streams.stdout && !spec.streams.stderr);
    }

    #[test]
    fn pty_flags_without_a_pty_request_are_ignored() {
        let mut req = ChannelRequest::default();
        req.set_env(
            META_ENV_KEY,
            &SessionMetadata::default().with_all_pty().encode().unwrap(),
        );
        let spec = req.launch(None, &host(None)).unwrap();
        assert!(!spec.streams.any());
        assert!(spec.pty.is_none());
    }

    #[test]
    fn missing_workdir_falls_back_to_home() {
        let temp = TempDir::new().unwrap();
        let mut req = ChannelRequest::default();
        let meta = SessionMetadata {
            pwd: "/definitely/not/here".into(),
            ..Default::default()
        };
        req.set_env(META_ENV_KEY, &meta.encode().unwrap());
        let spec = req
            .launch(None, &host(Some(temp.path().to_path_buf())))
            .unwrap();
        assert_eq!(spec.cwd, temp.path());
        assert_eq!(lookup(&spec.env, "HOME"), Some(&*temp.path().to_string_lossy()));
    }

    #[test]
    fn client_env_overrides_host_defaults() {
        let mut req = ChannelRequest::default();
        req.set_env("PATH", "/opt/bin");
        let spec = req.launch(None, &host(None)).unwrap();
        assert_eq!(lookup(&spec.env, "PATH"), Some("/opt/bin"));
        assert_eq!(spec.env.iter().filter(|(k, _)| k == "PATH").count(), 1);
    }
}
