//! Entry-point routing: management CLI, implicit remote run, or command stub.

use crate::cli::{Cli, Command, PathArgs, RunArgs};
use crate::links::LinkRegistry;
use crate::relay::terminal::StreamTtys;
use crate::relay::{run_session, CommandOptions, SessionPlan};
use crate::runtime::EndpointProbe;
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use ferry_common::env_filter::process_environment;
use ferry_common::{Direction, RelayConfig};
use ferry_shim::{Invocation, InvocationContext, CONTROL_NAME};
use std::time::Duration;

const CONTROL_FLAGS: &[&str] = &["-h", "--help", "-V", "--version", "help"];

/// Route one invocation and return the process exit code.
pub fn dispatch(ctx: InvocationContext) -> Result<i32> {
    match ctx.invocation {
        Invocation::Control => run_control(ctx.args),
        Invocation::ControlOrShell if is_control_invocation(&ctx.args) => run_control(ctx.args),
        Invocation::ControlOrShell => run_remote(ctx.args, CommandOptions::default()),
        Invocation::Stub(ref name) => {
            tracing::debug!(stub = %name, "relaying command link");
            let argv = ctx.stub_argv().unwrap_or_default();
            run_remote(argv, CommandOptions::default())
        }
    }
}

/// Whether a `ferry` argument list names a management subcommand rather than
/// a remote command.
pub fn is_control_invocation(args: &[String]) -> bool {
    let Some(first) = args.first() else {
        return false;
    };
    CONTROL_FLAGS.contains(&first.as_str()) || Cli::command().find_subcommand(first).is_some()
}

/// Parse and run management arguments (without argv0).
pub fn run_control(args: Vec<String>) -> Result<i32> {
    let argv = std::iter::once(CONTROL_NAME.to_string()).chain(args);
    let cli = match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version land here too, with exit code 0.
            err.print().context("failed to print usage")?;
            return Ok(err.exit_code());
        }
    };

    match cli.command {
        Command::Run(args) => run(args),
        Command::Link { names } => {
            let registry = LinkRegistry::from_home()?;
            for name in &names {
                let path = registry.link(name)?;
                println!("{}", path.display());
            }
            Ok(0)
        }
        Command::Unlink { names } => {
            let registry = LinkRegistry::from_home()?;
            for name in &names {
                registry.unlink(name)?;
            }
            Ok(0)
        }
        Command::Links { json } => {
            let names = LinkRegistry::from_home()?.list()?;
            if json {
                println!("{}", serde_json::to_string(&names)?);
            } else {
                for name in names {
                    println!("{name}");
                }
            }
            Ok(0)
        }
        Command::InstallDefaults => {
            LinkRegistry::from_home()?.install_defaults()?;
            Ok(0)
        }
        Command::Path(args) => translate_paths(args),
    }
}

fn run(args: RunArgs) -> Result<i32> {
    let options = args.options();
    run_remote(args.command, options)
}

fn translate_paths(args: PathArgs) -> Result<i32> {
    let config = RelayConfig::load()?;
    let context = config.path_context(args.machine.as_deref());
    let direction = if args.to_local {
        Direction::ToLocal
    } else {
        Direction::ToForeign
    };
    for path in &args.paths {
        println!("{}", context.translate(path, direction));
    }
    Ok(0)
}

/// Relay `argv` (empty means an interactive shell) and return its exit code.
pub fn run_remote(argv: Vec<String>, options: CommandOptions) -> Result<i32> {
    let config = RelayConfig::load()?;
    let endpoint = config.endpoint()?;
    let ttys = StreamTtys::detect();
    let plan = SessionPlan::build(&config, argv, &options, &process_environment(), ttys)?;
    let probe = EndpointProbe::new(Duration::from_millis(config.transport.start_timeout_ms));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let result = runtime.block_on(run_session(plan, &endpoint, &probe, ttys));
    // The stdin reader may still be parked in a blocking read.
    runtime.shutdown_background();
    result
}
