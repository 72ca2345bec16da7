//! Session server for the ferry relay.
//!
//! Speaks SSH on a unix socket or TCP port, reads the session metadata the
//! client sends as an environment variable and runs the requested command
//! with each stream on a PTY or a pipe as asked.

pub mod listener;
pub mod logging;
pub mod pty;
pub mod server;
pub mod session;
pub mod spawn;

pub use listener::AgentListener;
pub use session::{ArgvError, ChannelRequest, HostDefaults, LaunchSpec};
pub use spawn::{ProcessSpawner, UnixSpawner};
