//! The session loop: dial, describe the terminal, start the command and pump
//! bytes until the remote side closes the channel.

use super::exit::ExitReconciler;
use super::signals::{from_ssh_signal, SignalForwarder};
use super::terminal::{self, RawModeGuard, StreamTtys};
use super::transport;
use super::SessionPlan;
use crate::runtime::TargetRuntime;
use anyhow::{bail, Context, Result};
use ferry_common::{Endpoint, META_ENV_KEY};
use russh::{ChannelMsg, Disconnect, Pty};
use std::io::Read;
use std::thread;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

const DEFAULT_TERM: &str = "xterm";
const STDIN_CHUNK: usize = 8 * 1024;

/// Run one relayed session to completion and return the local exit code.
pub async fn run_session<R: TargetRuntime>(
    plan: SessionPlan,
    endpoint: &Endpoint,
    runtime: &R,
    ttys: StreamTtys,
) -> Result<i32> {
    let span = tracing::info_span!("session", id = %Uuid::now_v7(), user = %plan.user);
    drive(plan, endpoint, runtime, ttys).instrument(span).await
}

async fn drive<R: TargetRuntime>(
    plan: SessionPlan,
    endpoint: &Endpoint,
    runtime: &R,
    ttys: StreamTtys,
) -> Result<i32> {
    runtime.ensure_running(endpoint).await?;

    let handle = transport::connect(endpoint, &plan.user).await?;
    let mut channel = handle
        .channel_open_session()
        .await
        .context("failed to open session channel")?;

    let pty_fd = if ttys.any() { ttys.pty_fd() } else { None };
    let mut _raw_mode = None;
    if let Some(fd) = pty_fd {
        let snapshot = terminal::capture(fd).context("failed to read local terminal")?;
        let term = plan
            .env
            .get("TERM")
            .map(String::as_str)
            .unwrap_or(DEFAULT_TERM)
            .to_string();
        let modes: Vec<(Pty, u32)> = snapshot
            .modes
            .to_pairs()
            .into_iter()
            .filter_map(|(opcode, value)| Pty::from_u8(opcode).map(|pty| (pty, value)))
            .collect();
        channel
            .request_pty(
                false,
                &term,
                u32::from(snapshot.size.cols),
                u32::from(snapshot.size.rows),
                u32::from(snapshot.size.pixel_width),
                u32::from(snapshot.size.pixel_height),
                &modes,
            )
            .await
            .context("PTY request failed")?;
        tracing::debug!(%term, cols = snapshot.size.cols, rows = snapshot.size.rows, "requested PTY");

        if ttys.wants_raw_mode() {
            _raw_mode = Some(RawModeGuard::enter(fd).context("failed to enter raw mode")?);
        }
    }

    for (key, value) in &plan.env {
        channel
            .set_env(false, key.as_str(), value.as_str())
            .await
            .with_context(|| format!("failed to send variable {key}"))?;
    }
    let meta = plan.metadata.encode()?;
    channel
        .set_env(false, META_ENV_KEY, meta)
        .await
        .context("failed to send session metadata")?;

    match &plan.payload {
        Some(payload) => {
            tracing::debug!(mode = ?plan.metadata.mode, "starting command");
            channel.exec(true, payload.as_str()).await
        }
        None => {
            tracing::debug!("starting interactive shell");
            channel.request_shell(true).await
        }
    }
    .context("start request failed")?;

    let mut forwarder = SignalForwarder::install(pty_fd.is_some())?;
    let mut stdin_rx = spawn_stdin_reader()?;
    let mut stdin_open = true;
    let mut started = false;
    let mut exit = ExitReconciler::new();
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();

    loop {
        tokio::select! {
            msg = channel.wait() => {
                let Some(msg) = msg else { break };
                match msg {
                    ChannelMsg::Data { ref data } => {
                        stdout.write_all(data).await?;
                        stdout.flush().await?;
                    }
                    ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                        stderr.write_all(data).await?;
                        stderr.flush().await?;
                    }
                    ChannelMsg::Success => started = true,
                    ChannelMsg::Failure if !started => {
                        bail!("session server refused to start the command");
                    }
                    ChannelMsg::ExitStatus { exit_status } => {
                        tracing::debug!(exit_status, "remote exited");
                        exit.on_status(exit_status);
                    }
                    ChannelMsg::ExitSignal { signal_name, .. } => {
                        tracing::debug!(signal = ?signal_name, "remote killed by signal");
                        exit.on_signal(from_ssh_signal(&signal_name));
                    }
                    ChannelMsg::Eof => exit.on_eof(),
                    ChannelMsg::Close => break,
                    _ => {}
                }
            }
            Some(sig) = forwarder.signals.recv() => {
                tracing::debug!(signal = ?sig, "forwarding signal");
                if let Err(err) = channel.signal(sig).await {
                    tracing::warn!(error = %err, "failed to forward signal");
                }
            }
            Some(()) = forwarder.resizes.recv() => {
                if let Some(fd) = pty_fd {
                    match terminal::current_size(fd) {
                        Ok(size) => {
                            if let Err(err) = channel
                                .window_change(
                                    u32::from(size.cols),
                                    u32::from(size.rows),
                                    u32::from(size.pixel_width),
                                    u32::from(size.pixel_height),
                                )
                                .await
                            {
                                tracing::warn!(error = %err, "failed to send window change");
                            }
                        }
                        Err(err) => tracing::warn!(error = %err, "failed to read window size"),
                    }
                }
            }
            chunk = stdin_rx.recv(), if stdin_open => {
                match chunk {
                    Some(bytes) => {
                        if let Err(err) = channel.data(&bytes[..]).await {
                            tracing::debug!(error = %err, "remote stopped accepting input");
                            stdin_open = false;
                        }
                    }
                    None => {
                        stdin_open = false;
                        if let Err(err) = channel.eof().await {
                            tracing::debug!(error = %err, "failed to send EOF");
                        }
                    }
                }
            }
        }
    }

    drop(forwarder);
    if let Err(err) = handle
        .disconnect(Disconnect::ByApplication, "", "en")
        .await
    {
        tracing::debug!(error = %err, "disconnect failed");
    }

    let code = exit.finish();
    tracing::debug!(code, has_status = exit.has_status(), "session finished");
    Ok(code)
}

/// Stdin is read on a plain thread: a blocking read must never hold up
/// runtime shutdown once the session has ended.
fn spawn_stdin_reader() -> Result<mpsc::Receiver<Vec<u8>>> {
    let (tx, rx) = mpsc::channel(16);
    thread::Builder::new()
        .name("ferry-stdin".into())
        .spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = [0u8; STDIN_CHUNK];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        tracing::debug!(error = %err, "stdin read failed");
                        break;
                    }
                }
            }
        })
        .context("failed to spawn stdin thread")?;
    Ok(rx)
}
