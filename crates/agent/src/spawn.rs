//! Child process creation.
//!
//! The server only ever talks to [`ProcessSpawner`]; the unix implementation
//! puts the child in a new session and, when a PTY is in use, makes the PTY
//! its controlling terminal.

use crate::pty::{self, PtyPair};
use crate::session::LaunchSpec;
use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::Stdio;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// A started child plus whichever ends of its streams the server drives.
pub struct SpawnedProcess {
    pub child: Child,
    /// Present when at least one stream is on the PTY.
    pub master: Option<File>,
    pub stdin: Option<ChildStdin>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

impl SpawnedProcess {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

pub trait ProcessSpawner: Send + Sync + 'static {
    fn spawn(&self, spec: &LaunchSpec) -> Result<SpawnedProcess>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnixSpawner;

fn stream(slave: Option<&OwnedFd>, on_pty: bool) -> Result<Stdio> {
    match slave {
        Some(slave) if on_pty => Ok(Stdio::from(
            slave.try_clone().context("failed to duplicate PTY slave")?,
        )),
        _ => Ok(Stdio::piped()),
    }
}

impl ProcessSpawner for UnixSpawner {
    fn spawn(&self, spec: &LaunchSpec) -> Result<SpawnedProcess> {
        let pair = spec.pty.as_ref().map(pty::open).transpose()?;
        let slave = pair.as_ref().map(|pair| &pair.slave);

        let mut command = Command::new(&spec.program);
        command
            .arg0(&spec.argv0)
            .args(&spec.args)
            .env_clear()
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .current_dir(&spec.cwd)
            .stdin(stream(slave, spec.streams.stdin)?)
            .stdout(stream(slave, spec.streams.stdout)?)
            .stderr(stream(slave, spec.streams.stderr)?);

        let controlling_tty = slave.map(|slave| slave.as_raw_fd());
        // SAFETY: the hook only calls async-signal-safe functions.
        unsafe {
            command.pre_exec(move || {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                if let Some(fd) = controlling_tty {
                    if libc::ioctl(fd, libc::TIOCSCTTY as _, 0) == -1 {
                        return Err(io::Error::last_os_error());
                    }
                }
                Ok(())
            });
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to start {}", spec.program))?;
        tracing::debug!(pid = ?child.id(), program = %spec.program, pty = spec.pty.is_some(), "spawned child");

        // Our copies of the slave must go, or reads on the master never end.
        let master = pair.map(|PtyPair { master, slave }| {
            drop(slave);
            master
        });
        drop(command);

        Ok(SpawnedProcess {
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
            master,
        })
    }
}
