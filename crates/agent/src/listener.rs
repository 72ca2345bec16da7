use crate::server::{server_config, SessionHandler};
use crate::session::HostDefaults;
use crate::spawn::ProcessSpawner;
use anyhow::{Context, Result};
use ferry_common::Endpoint;
use russh::server;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

enum Socket {
    Unix(UnixListener),
    Tcp(TcpListener),
}

enum Accepted {
    Unix(UnixStream),
    Tcp(TcpStream, String),
}

/// A bound endpoint, ready to serve sessions.
pub struct AgentListener<S> {
    socket: Socket,
    endpoint: Endpoint,
    config: Arc<server::Config>,
    spawner: Arc<S>,
    host: Arc<HostDefaults>,
}

impl<S: ProcessSpawner> AgentListener<S> {
    /// Bind `endpoint`. A stale socket file from an earlier run is replaced.
    pub async fn bind(endpoint: &Endpoint, spawner: S) -> Result<Self> {
        let (socket, endpoint) = match endpoint {
            Endpoint::Unix(path) => {
                if path.exists() {
                    std::fs::remove_file(path)
                        .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
                }
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
                let listener = UnixListener::bind(path)
                    .with_context(|| format!("failed to bind unix listener on {}", path.display()))?;
                (Socket::Unix(listener), endpoint.clone())
            }
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr.as_str())
                    .await
                    .with_context(|| format!("failed to bind tcp listener on {addr}"))?;
                let local = listener
                    .local_addr()
                    .map(|local| Endpoint::Tcp(local.to_string()))
                    .unwrap_or_else(|_| endpoint.clone());
                (Socket::Tcp(listener), local)
            }
        };

        Ok(Self {
            socket,
            endpoint,
            config: server_config()?,
            spawner: Arc::new(spawner),
            host: Arc::new(HostDefaults::detect()),
        })
    }

    /// Where clients should connect; for TCP this carries the real port.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Accept connections until `cancel` fires, then wait for open sessions.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(endpoint = %self.endpoint, "listening for sessions");
        let mut sessions: JoinSet<Result<()>> = JoinSet::new();
        let mut counter: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("listener shutting down");
                    break;
                }
                Some(res) = sessions.join_next(), if !sessions.is_empty() => log_session_end(res),
                accepted = self.accept() => {
                    counter = counter.wrapping_add(1);
                    match accepted {
                        Ok(Accepted::Unix(stream)) => {
                            self.spawn_session(&mut sessions, stream, counter, "unix".to_string());
                        }
                        Ok(Accepted::Tcp(stream, peer)) => {
                            self.spawn_session(&mut sessions, stream, counter, peer);
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "failed to accept connection");
                            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                        }
                    }
                }
            }
        }

        if let Endpoint::Unix(path) = &self.endpoint {
            let _ = std::fs::remove_file(path);
        }
        while let Some(res) = sessions.join_next().await {
            log_session_end(res);
        }
        Ok(())
    }

    async fn accept(&self) -> std::io::Result<Accepted> {
        match &self.socket {
            Socket::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Accepted::Unix(stream))
            }
            Socket::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                stream.set_nodelay(true).ok();
                Ok(Accepted::Tcp(stream, peer.to_string()))
            }
        }
    }

    fn spawn_session<T>(&self, sessions: &mut JoinSet<Result<()>>, stream: T, id: u64, peer: String)
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let handler = SessionHandler::new(self.spawner.clone(), self.host.clone());
        let config = self.config.clone();
        let span = tracing::info_span!("connection", id, %peer);
        sessions.spawn(
            async move {
                tracing::debug!("connection accepted");
                let session = server::run_stream(config, stream, handler).await?;
                session.await?;
                Ok(())
            }
            .instrument(span),
        );
    }
}

fn log_session_end(res: Result<Result<()>, tokio::task::JoinError>) {
    match res {
        Ok(Ok(())) => tracing::debug!("connection closed"),
        // Readiness probes connect and hang up without a handshake.
        Ok(Err(err)) => tracing::debug!(error = %err, "connection ended with error"),
        Err(join_err) => tracing::warn!("connection task panicked: {join_err}"),
    }
}
