//! Invocation context and argv0 detection
//!
//! One binary serves every entry point. What it does is decided purely by the
//! file name it was started under, never by flags.

use anyhow::{anyhow, Result};
use std::env;
use std::ffi::OsString;
use std::path::Path;

/// Always the management CLI.
pub const CONTROL_NAME: &str = "ferryctl";
/// Management CLI when the first argument is a subcommand, relay otherwise.
pub const CONTROL_OR_SHELL_NAME: &str = "ferry";

/// How the binary was invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Control,
    ControlOrShell,
    /// Started through a command link with this name.
    Stub(String),
}

impl Invocation {
    /// Classify an argv0. Only the basename matters; a login-shell `-` prefix
    /// is ignored.
    pub fn from_argv0(argv0: &str) -> Self {
        let base = Path::new(argv0)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| argv0.to_string());
        let base = base.strip_prefix('-').unwrap_or(&base);

        match base {
            CONTROL_NAME => Self::Control,
            CONTROL_OR_SHELL_NAME | "" => Self::ControlOrShell,
            other => Self::Stub(other.to_string()),
        }
    }
}

/// Execution context for a single invocation
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub invocation: Invocation,
    /// argv0 exactly as received
    pub argv0: String,
    /// Arguments after argv0
    pub args: Vec<String>,
}

impl InvocationContext {
    /// Create context from the process arguments
    pub fn from_env() -> Result<Self> {
        Self::from_args(env::args_os())
    }

    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut args = args.into_iter().map(|arg| {
            arg.into_string()
                .map_err(|raw| anyhow!("argument is not valid UTF-8: {}", raw.to_string_lossy()))
        });
        let argv0 = args.next().transpose()?.unwrap_or_default();
        let args = args.collect::<Result<Vec<_>>>()?;
        let invocation = Invocation::from_argv0(&argv0);
        tracing::debug!(?invocation, argc = args.len(), "classified invocation");

        Ok(Self {
            invocation,
            argv0,
            args,
        })
    }

    /// The remote argv a command link stands for: its own name, then every
    /// argument untouched.
    pub fn stub_argv(&self) -> Option<Vec<String>> {
        match &self.invocation {
            Invocation::Stub(name) => {
                let mut argv = Vec::with_capacity(self.args.len() + 1);
                argv.push(name.clone());
                argv.extend(self.args.iter().cloned());
                Some(argv)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ctx(args: &[&str]) -> InvocationContext {
        InvocationContext::from_args(args.iter().map(OsString::from)).unwrap()
    }

    #[test]
    fn control_names_by_basename() {
        assert_eq!(Invocation::from_argv0("ferryctl"), Invocation::Control);
        assert_eq!(
            Invocation::from_argv0("/usr/local/bin/ferryctl"),
            Invocation::Control
        );
        assert_eq!(Invocation::from_argv0("ferry"), Invocation::ControlOrShell);
        assert_eq!(
            Invocation::from_argv0("-ferry"),
            Invocation::ControlOrShell
        );
        assert_eq!(Invocation::from_argv0(""), Invocation::ControlOrShell);
    }

    #[test]
    fn anything_else_is_a_stub() {
        assert_eq!(
            Invocation::from_argv0("/home/me/.ferry/links/uname"),
            Invocation::Stub("uname".into())
        );
        assert_eq!(
            Invocation::from_argv0("ferry-agent"),
            Invocation::Stub("ferry-agent".into())
        );
    }

    #[test]
    fn stub_argv_prepends_link_name() {
        let context = ctx(&["/links/git", "status", "--short"]);
        assert_eq!(
            context.stub_argv(),
            Some(vec!["git".to_string(), "status".into(), "--short".into()])
        );
        assert_eq!(ctx(&["ferry", "uname"]).stub_argv(), None);
    }

    #[test]
    fn empty_args_default_to_control_or_shell() {
        let context = InvocationContext::from_args(Vec::<OsString>::new()).unwrap();
        assert_eq!(context.invocation, Invocation::ControlOrShell);
        assert!(context.args.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_arguments_are_rejected() {
        use std::os::unix::ffi::OsStringExt;
        let bad = OsString::from_vec(vec![0x66, 0xff]);
        let err = InvocationContext::from_args([OsString::from("ls"), bad]).unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    proptest! {
        #[test]
        fn classification_ignores_directories(dir in "(/[a-z]{1,6}){0,4}", name in "[a-z][a-z0-9_.]{0,10}") {
            let path = format!("{dir}/{name}");
            prop_assert_eq!(Invocation::from_argv0(&path), Invocation::from_argv0(&name));
        }
    }
}
