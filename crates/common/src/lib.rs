//! Shared pieces of the ferry relay protocol.
//!
//! Everything here is used by both the local client and the remote agent:
//! the session metadata record, the environment filter, path translation,
//! terminal-mode conversion, configuration and the on-disk layout.

pub mod config;
pub mod env_filter;
pub mod metadata;
pub mod path_translate;
pub mod paths;
pub mod session_user;
#[cfg(unix)]
pub mod signals;
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub mod termios;

pub use config::{Endpoint, EndpointError, RelayConfig};
pub use env_filter::{EnvFilter, EnvironmentMap};
pub use metadata::{CommandMode, MetadataError, SessionMetadata, META_ENV_KEY};
pub use path_translate::{PathContext, TranslationMode};
pub use session_user::SessionUser;

/// Which way a value is crossing the VM boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From this machine into the guest.
    ToForeign,
    /// From the guest back to this machine.
    ToLocal,
}

