//! Readiness of the target runtime before a session is dialed.
//!
//! The relay itself never retries; waiting for the VM (or a test agent) to
//! come up happens here and only here.

use anyhow::{bail, Result};
use ferry_common::Endpoint;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::net::{TcpStream, UnixStream};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub trait TargetRuntime {
    /// Resolve once `endpoint` accepts connections, or fail.
    fn ensure_running(&self, endpoint: &Endpoint) -> impl Future<Output = Result<()>> + Send;
}

/// Polls the endpoint until it answers or the deadline passes.
#[derive(Debug, Clone)]
pub struct EndpointProbe {
    timeout: Duration,
}

impl EndpointProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

async fn reachable(endpoint: &Endpoint) -> bool {
    match endpoint {
        Endpoint::Unix(path) => UnixStream::connect(path).await.is_ok(),
        Endpoint::Tcp(addr) => TcpStream::connect(addr.as_str()).await.is_ok(),
    }
}

impl TargetRuntime for EndpointProbe {
    async fn ensure_running(&self, endpoint: &Endpoint) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if reachable(endpoint).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!(
                    "{endpoint} is not reachable after {}ms; is the VM running?",
                    self.timeout.as_millis()
                );
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
