//! ferry invocation detection
//!
//! The same binary is installed under several names:
//!
//! - `ferryctl` is always the management CLI
//! - `ferry` is the management CLI when given a subcommand, otherwise it
//!   relays the arguments as a remote command (or opens a remote shell)
//! - any other name is a command link and relays `<name> <args...>`
//!
//! ```rust
//! use ferry_shim::{Invocation, InvocationContext};
//!
//! let ctx = InvocationContext::from_args(["/links/uname", "-a"].map(Into::into)).unwrap();
//! assert_eq!(ctx.invocation, Invocation::Stub("uname".into()));
//! assert_eq!(ctx.stub_argv().unwrap(), vec!["uname", "-a"]);
//! ```

pub use context::{Invocation, InvocationContext, CONTROL_NAME, CONTROL_OR_SHELL_NAME};

mod context;
