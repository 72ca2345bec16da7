//! Local side of the ferry relay.
//!
//! The same binary serves `ferry`, `ferryctl` and every command link; see
//! [`dispatch`] for how an invocation is routed.

pub mod cli;
pub mod dispatch;
pub mod links;
pub mod logging;
pub mod relay;
pub mod runtime;

use anyhow::Result;
use ferry_shim::{Invocation, InvocationContext};

pub use dispatch::{dispatch, run_control, run_remote};
pub use links::{LinkError, LinkRegistry};
pub use relay::{CommandOptions, SessionPlan};
pub use runtime::{EndpointProbe, TargetRuntime};

/// Entry for the `ferry` binary: routed by argv0.
pub fn run_from_env() -> Result<i32> {
    logging::init();
    dispatch(InvocationContext::from_env()?)
}

/// Entry for the `ferryctl` binary: always the management CLI, whatever name
/// it was started under.
pub fn run_control_from_env() -> Result<i32> {
    logging::init();
    let mut ctx = InvocationContext::from_env()?;
    ctx.invocation = Invocation::Control;
    dispatch(ctx)
}
