//! SSH client connection to the session server.
//!
//! Trust comes from the endpoint being local to this machine/VM pair: every
//! host key is accepted and the password is a fixed placeholder. The user
//! name only carries routing (`user@container`).

use anyhow::{bail, Context, Result};
use ferry_common::{Endpoint, SessionUser};
use russh::client;
use russh::keys;
use std::sync::Arc;
use tokio::net::{TcpStream, UnixStream};

/// Not a secret; the server accepts any credential.
pub const PLACEHOLDER_PASSWORD: &str = "ferry";

/// Minimal russh client handler — accepts all server keys.
pub struct RelayClient;

impl client::Handler for RelayClient {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub async fn connect(endpoint: &Endpoint, user: &SessionUser) -> Result<client::Handle<RelayClient>> {
    let config = Arc::new(client::Config::default());
    tracing::debug!(%endpoint, %user, "dialing session server");

    let mut handle = match endpoint {
        Endpoint::Unix(path) => {
            let stream = UnixStream::connect(path)
                .await
                .with_context(|| format!("failed to connect to {}", path.display()))?;
            client::connect_stream(config, stream, RelayClient)
                .await
                .context("SSH handshake failed")?
        }
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr.as_str())
                .await
                .with_context(|| format!("failed to connect to {addr}"))?;
            stream.set_nodelay(true).ok();
            client::connect_stream(config, stream, RelayClient)
                .await
                .context("SSH handshake failed")?
        }
    };

    let auth = handle
        .authenticate_password(user.to_string(), PLACEHOLDER_PASSWORD)
        .await
        .context("SSH authentication failed")?;
    if !auth.success() {
        bail!("session server rejected user {user}");
    }
    Ok(handle)
}
