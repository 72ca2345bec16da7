//! SSH side of the agent: one [`SessionHandler`] per connection.

use crate::pty;
use crate::session::{ChannelRequest, HostDefaults, PtyRequest, PtyStreams};
use crate::spawn::{ProcessSpawner, SpawnedProcess};
use anyhow::{Context, Result};
use ferry_common::signals::signal_number;
use ferry_common::termios::{PortableModes, WindowSize};
use ferry_common::SessionUser;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use rand_core::OsRng;
use russh::keys::{Algorithm, PrivateKey};
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty, Sig};
use std::collections::HashMap;
use std::fs::File;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

const OUTPUT_CHUNK: usize = 32 * 1024;
const STDERR_EXT: u32 = 1;

/// Server settings with a fresh host key. Clients never verify it.
pub fn server_config() -> Result<Arc<server::Config>> {
    let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
        .context("failed to generate host key")?;
    Ok(Arc::new(server::Config {
        keys: vec![key],
        auth_rejection_time: Duration::ZERO,
        auth_rejection_time_initial: Some(Duration::ZERO),
        inactivity_timeout: None,
        ..Default::default()
    }))
}

#[derive(Default)]
struct ChannelState {
    request: ChannelRequest,
    running: Option<RunningChild>,
}

struct RunningChild {
    stdin: Option<mpsc::UnboundedSender<Vec<u8>>>,
    pid: Option<u32>,
    master: Option<File>,
}

impl RunningChild {
    fn signal(&self, signal: Signal) {
        let Some(pid) = self.pid else { return };
        // The child leads its own session, so the whole job gets it.
        if let Err(err) = killpg(Pid::from_raw(pid as i32), signal) {
            tracing::debug!(pid, ?signal, error = %err, "signal delivery failed");
        }
    }
}

pub struct SessionHandler<S> {
    spawner: Arc<S>,
    host: Arc<HostDefaults>,
    user: Option<SessionUser>,
    channels: HashMap<ChannelId, ChannelState>,
}

impl<S: ProcessSpawner> SessionHandler<S> {
    pub fn new(spawner: Arc<S>, host: Arc<HostDefaults>) -> Self {
        Self {
            spawner,
            host,
            user: None,
            channels: HashMap::new(),
        }
    }

    fn accept_user(&mut self, user: &str) -> Auth {
        let user = SessionUser::parse(user);
        tracing::info!(%user, "client authenticated");
        self.user = Some(user);
        Auth::Accept
    }

    fn start(
        &mut self,
        channel: ChannelId,
        payload: Option<&[u8]>,
        session: &mut Session,
    ) -> Result<(), russh::Error> {
        let state = match self.channels.get_mut(&channel) {
            Some(state) if state.running.is_none() => state,
            _ => return session.channel_failure(channel),
        };
        session.channel_success(channel)?;
        let handle = session.handle();

        let spec = match state.request.launch(payload, &self.host) {
            Ok(spec) => spec,
            Err(err) => {
                tracing::warn!(error = %err, "rejecting start request");
                tokio::spawn(report_failure(handle, channel, err.to_string()));
                return Ok(());
            }
        };
        tracing::info!(program = %spec.program, args = spec.args.len(), cwd = %spec.cwd.display(), pty = spec.pty.is_some(), "starting child");

        let process = match self.spawner.spawn(&spec) {
            Ok(process) => process,
            Err(err) => {
                tracing::warn!(error = %err, "spawn failed");
                tokio::spawn(report_failure(handle, channel, format!("{err:#}")));
                return Ok(());
            }
        };

        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        state.running = Some(RunningChild {
            stdin: Some(stdin_tx),
            pid: process.pid(),
            master: process.master.as_ref().and_then(|m| m.try_clone().ok()),
        });
        tokio::spawn(supervise(handle, channel, process, spec.streams, stdin_rx));
        Ok(())
    }
}

impl<S> Drop for SessionHandler<S> {
    fn drop(&mut self) {
        for state in self.channels.values() {
            if let Some(running) = &state.running {
                running.signal(Signal::SIGHUP);
            }
        }
    }
}

impl<S: ProcessSpawner> server::Handler for SessionHandler<S> {
    type Error = anyhow::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        Ok(self.accept_user(user))
    }

    async fn auth_password(&mut self, user: &str, _password: &str) -> Result<Auth, Self::Error> {
        Ok(self.accept_user(user))
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), ChannelState::default());
        Ok(true)
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(state) = self.channels.get_mut(&channel) {
            state.request.set_env(variable_name, variable_value);
        }
        Ok(())
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        modes: &[(Pty, u32)],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(state) = self.channels.get_mut(&channel) {
            state.request.set_pty(PtyRequest {
                term: term.to_string(),
                size: window_size(col_width, row_height, pix_width, pix_height),
                modes: PortableModes::from_pairs(modes.iter().map(|(op, value)| (*op as u8, *value))),
            });
            tracing::debug!(term, cols = col_width, rows = row_height, modes = modes.len(), "PTY requested");
        }
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.start(channel, None, session)?;
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.start(channel, Some(data), session)?;
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let stdin = self
            .channels
            .get(&channel)
            .and_then(|state| state.running.as_ref())
            .and_then(|running| running.stdin.as_ref());
        if let Some(stdin) = stdin {
            let _ = stdin.send(data.to_vec());
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(running) = self
            .channels
            .get_mut(&channel)
            .and_then(|state| state.running.as_mut())
        {
            running.stdin = None;
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(ChannelState {
            running: Some(running),
            ..
        }) = self.channels.remove(&channel)
        {
            running.signal(Signal::SIGHUP);
        }
        Ok(())
    }

    async fn signal(
        &mut self,
        channel: ChannelId,
        signal: Sig,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Some(running) = self
            .channels
            .get(&channel)
            .and_then(|state| state.running.as_ref())
        else {
            return Ok(());
        };
        match signal_number(sig_name(&signal)).and_then(|signo| Signal::try_from(signo).ok()) {
            Some(sig) => {
                tracing::debug!(?sig, "delivering signal");
                running.signal(sig);
            }
            None => tracing::warn!(signal = ?signal, "ignoring unknown signal"),
        }
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let master = self
            .channels
            .get(&channel)
            .and_then(|state| state.running.as_ref())
            .and_then(|running| running.master.as_ref());
        if let Some(master) = master {
            let size = window_size(col_width, row_height, pix_width, pix_height);
            if let Err(err) = pty::resize(master, size) {
                tracing::warn!(error = %err, "failed to resize PTY");
            }
        }
        Ok(())
    }
}

fn window_size(cols: u32, rows: u32, pixel_width: u32, pixel_height: u32) -> WindowSize {
    let clamp = |value: u32| u16::try_from(value).unwrap_or(u16::MAX);
    WindowSize {
        cols: clamp(cols),
        rows: clamp(rows),
        pixel_width: clamp(pixel_width),
        pixel_height: clamp(pixel_height),
    }
}

fn sig_name(sig: &Sig) -> &str {
    match sig {
        Sig::ABRT => "ABRT",
        Sig::ALRM => "ALRM",
        Sig::FPE => "FPE",
        Sig::HUP => "HUP",
        Sig::ILL => "ILL",
        Sig::INT => "INT",
        Sig::KILL => "KILL",
        Sig::PIPE => "PIPE",
        Sig::QUIT => "QUIT",
        Sig::SEGV => "SEGV",
        Sig::TERM => "TERM",
        Sig::USR1 => "USR1",
        Sig::Custom(name) => name.as_str(),
    }
}

/// Process exit code as the client should see it.
pub fn exit_code(status: ExitStatus) -> u32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code as u32,
        (None, Some(signo)) => 128 + signo as u32,
        (None, None) => 255,
    }
}

async fn report_failure(handle: server::Handle, channel: ChannelId, message: String) {
    let text = format!("ferry-agent: {message}\n");
    let _ = handle
        .extended_data(channel, STDERR_EXT, CryptoVec::from_slice(text.as_bytes()))
        .await;
    finish(&handle, channel, 1).await;
}

async fn finish(handle: &server::Handle, channel: ChannelId, code: u32) {
    let _ = handle.exit_status_request(channel, code).await;
    let _ = handle.eof(channel).await;
    let _ = handle.close(channel).await;
}

/// Pump the child's streams until it exits and its output is drained, then
/// report the status.
async fn supervise(
    handle: server::Handle,
    channel: ChannelId,
    mut process: SpawnedProcess,
    streams: PtyStreams,
    stdin_rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let master = process.master.take();
    let clone_master = || {
        master
            .as_ref()
            .and_then(|m| m.try_clone().ok())
            .map(tokio::fs::File::from_std)
    };

    let stdin_task = match (streams.stdin, clone_master(), process.stdin.take()) {
        (true, Some(master), _) => Some(tokio::spawn(pump_input(master, stdin_rx))),
        (false, _, Some(stdin)) => Some(tokio::spawn(pump_input(stdin, stdin_rx))),
        _ => None,
    };

    let mut outputs = JoinSet::new();
    if streams.stdout || streams.stderr {
        if let Some(master) = clone_master() {
            let ext = (!streams.stdout).then_some(STDERR_EXT);
            outputs.spawn(pump_output(handle.clone(), channel, master, ext));
        }
    }
    if let Some(stdout) = process.stdout.take() {
        outputs.spawn(pump_output(handle.clone(), channel, stdout, None));
    }
    if let Some(stderr) = process.stderr.take() {
        outputs.spawn(pump_output(handle.clone(), channel, stderr, Some(STDERR_EXT)));
    }
    drop(master);

    let status = process.child.wait().await;
    while outputs.join_next().await.is_some() {}
    if let Some(task) = stdin_task {
        task.abort();
    }

    let code = match status {
        Ok(status) => exit_code(status),
        Err(err) => {
            tracing::warn!(error = %err, "failed to wait for child");
            1
        }
    };
    tracing::info!(code, "child exited");
    finish(&handle, channel, code).await;
}

async fn pump_input<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut stdin_rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(bytes) = stdin_rx.recv().await {
        if writer.write_all(&bytes).await.is_err() || writer.flush().await.is_err() {
            break;
        }
    }
}

async fn pump_output<R: AsyncRead + Unpin>(
    handle: server::Handle,
    channel: ChannelId,
    mut reader: R,
    ext: Option<u32>,
) {
    let mut buf = vec![0u8; OUTPUT_CHUNK];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            // A PTY master reads EIO once the last slave closes.
            Err(err) => {
                tracing::trace!(error = %err, "output stream ended");
                break;
            }
        };
        let data = CryptoVec::from_slice(&buf[..n]);
        let sent = match ext {
            Some(code) => handle.extended_data(channel, code, data).await,
            None => handle.data(channel, data).await,
        };
        if sent.is_err() {
            break;
        }
    }
}
