//! Relay session engine: runs one command (or shell) on the remote side and
//! mirrors its streams, signals, window size and exit status locally.

pub mod exit;
pub mod session;
pub mod signals;
pub mod terminal;
pub mod transport;

use anyhow::{Context, Result};
use ferry_common::{
    CommandMode, Direction, EnvironmentMap, RelayConfig, SessionMetadata, SessionUser,
};
use terminal::StreamTtys;

pub use exit::EXIT_STATUS_MISSING;
pub use session::run_session;

/// Per-invocation knobs from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// Sent as-is, without path translation.
    pub workdir: Option<String>,
    /// Applied after the filtered environment, so these always win.
    pub extra_env: Vec<(String, String)>,
    /// Send no inherited variables at all.
    pub no_inherit_env: bool,
    pub user: Option<String>,
    pub container: Option<String>,
    /// Join argv into one string for the remote login shell.
    pub shell: bool,
    /// Rewrite path-shaped arguments into the remote namespace.
    pub translate_paths: bool,
}

/// Everything decided before dialing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    pub user: SessionUser,
    pub env: EnvironmentMap,
    pub metadata: SessionMetadata,
    /// Start-request payload; `None` asks for an interactive shell.
    pub payload: Option<String>,
}

impl SessionPlan {
    pub fn build(
        config: &RelayConfig,
        argv: Vec<String>,
        options: &CommandOptions,
        source_env: &EnvironmentMap,
        ttys: StreamTtys,
    ) -> Result<Self> {
        let user = config
            .session_user()
            .with_user(options.user.clone())
            .with_container(options.container.clone());
        let paths = config.path_context(Some(&user.container));

        let pwd = match &options.workdir {
            Some(dir) => dir.clone(),
            None => {
                let cwd = std::env::current_dir().context("failed to read current directory")?;
                paths.to_foreign(&cwd.to_string_lossy())
            }
        };

        let mut env = if options.no_inherit_env {
            EnvironmentMap::new()
        } else {
            config.env_filter().build(source_env, Direction::ToForeign)
        };
        for (key, value) in &options.extra_env {
            env.insert(key.clone(), value.clone());
        }

        let argv = if options.translate_paths {
            paths.translate_args(&argv, Direction::ToForeign)
        } else {
            argv
        };

        let mode = if options.shell || argv.is_empty() {
            CommandMode::Shell
        } else {
            CommandMode::RawArgv
        };
        let payload = match (argv.is_empty(), mode) {
            (true, _) => None,
            (false, CommandMode::RawArgv) => {
                Some(serde_json::to_string(&argv).context("failed to encode argv")?)
            }
            (false, CommandMode::Shell) => Some(shell_words::join(&argv)),
        };

        let metadata = SessionMetadata {
            pwd,
            mode,
            argv0: None,
            pty_stdin: ttys.stdin,
            pty_stdout: ttys.stdout,
            pty_stderr: ttys.stderr,
            fallback: false,
        };

        Ok(Self {
            user,
            env,
            metadata,
            payload,
        })
    }

    pub fn wants_pty(&self) -> bool {
        self.metadata.wants_pty()
    }
}
