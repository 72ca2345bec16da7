use crate::relay::CommandOptions;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "ferryctl")]
#[command(version, about = "Run commands inside the ferry VM and manage command links", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command remotely (an interactive shell when none is given)
    Run(RunArgs),
    /// Expose remote commands locally under their own names
    Link {
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,
    },
    /// Remove user-managed command links
    Unlink {
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,
    },
    /// List user-managed command links
    Links {
        /// Emit a JSON array instead of one name per line
        #[arg(long)]
        json: bool,
    },
    /// Recreate the always-available command links
    InstallDefaults,
    /// Translate paths between this machine and the VM
    Path(PathArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Hand the command to the login shell as one string
    #[arg(short = 's', long = "shell")]
    pub shell: bool,

    /// Translate path arguments into the VM namespace
    #[arg(short = 'p', long = "path")]
    pub translate_paths: bool,

    /// Target machine (container) name
    #[arg(short = 'm', long = "machine", value_name = "NAME")]
    pub machine: Option<String>,

    /// Remote user
    #[arg(short = 'u', long = "user", value_name = "USER")]
    pub user: Option<String>,

    /// Remote working directory, used as-is
    #[arg(short = 'w', long = "workdir", value_name = "DIR")]
    pub workdir: Option<String>,

    /// Extra environment variable for the remote command
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Do not pass any inherited environment variables
    #[arg(long = "no-env")]
    pub no_env: bool,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl RunArgs {
    pub fn options(&self) -> CommandOptions {
        CommandOptions {
            workdir: self.workdir.clone(),
            extra_env: self.env.clone(),
            no_inherit_env: self.no_env,
            user: self.user.clone(),
            container: self.machine.clone(),
            shell: self.shell,
            translate_paths: self.translate_paths,
        }
    }
}

#[derive(Args, Debug)]
pub struct PathArgs {
    /// Map local paths to VM paths (default)
    #[arg(long = "to-foreign", conflicts_with = "to_local")]
    pub to_foreign: bool,

    /// Map VM paths to local paths
    #[arg(long = "to-local")]
    pub to_local: bool,

    /// Machine whose export is resolved when mapping to local paths
    #[arg(short = 'm', long = "machine", value_name = "NAME")]
    pub machine: Option<String>,

    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<String>,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_keeps_flags_after_the_command() {
        let cli = Cli::try_parse_from(["ferryctl", "run", "-m", "alpine", "ls", "-la", "--color"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.machine.as_deref(), Some("alpine"));
        assert_eq!(args.command, vec!["ls", "-la", "--color"]);
    }

    #[test]
    fn run_options_carry_every_flag() {
        let cli = Cli::try_parse_from([
            "ferryctl", "run", "-s", "-p", "-u", "root", "-w", "/srv", "-e", "A=1=2", "--no-env",
            "--", "make",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let options = args.options();
        assert!(options.shell && options.translate_paths && options.no_inherit_env);
        assert_eq!(options.user.as_deref(), Some("root"));
        assert_eq!(options.workdir.as_deref(), Some("/srv"));
        assert_eq!(options.extra_env, vec![("A".to_string(), "1=2".to_string())]);
        assert_eq!(args.command, vec!["make"]);
    }

    #[test]
    fn env_pair_requires_a_key() {
        assert!(parse_env_pair("=x").is_err());
        assert!(parse_env_pair("novalue").is_err());
        assert_eq!(parse_env_pair("K=").unwrap(), ("K".into(), String::new()));
    }

    #[test]
    fn path_directions_conflict() {
        assert!(Cli::try_parse_from(["ferryctl", "path", "--to-foreign", "--to-local", "/x"]).is_err());
        assert!(Cli::try_parse_from(["ferryctl", "path"]).is_err());
    }
}
