use anyhow::Result;
use clap::Parser;
use ferry_agent::{logging, AgentListener, UnixSpawner};
use ferry_common::{Endpoint, RelayConfig};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "ferry-agent")]
#[command(version, about = "Session server for ferry relays", long_about = None)]
struct Args {
    /// Endpoint to listen on (unix:<path>, <path>, tcp:<host:port> or <host:port>);
    /// defaults to the configured transport endpoint
    #[arg(long, value_name = "ENDPOINT")]
    listen: Option<Endpoint>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();
    let endpoint = match args.listen {
        Some(endpoint) => endpoint,
        None => RelayConfig::load()?.endpoint()?,
    };

    let host = gethostname::gethostname();
    tracing::info!(host = %host.to_string_lossy(), version = env!("CARGO_PKG_VERSION"), "ferry-agent starting");

    let listener = AgentListener::bind(&endpoint, UnixSpawner).await?;
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            shutdown.cancel();
        }
    });

    listener.run(cancel).await
}
