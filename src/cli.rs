//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the p2p tracker.

use clap::{ArgAction, Parser, Subcommand};

/// P2P tracking service
///
/// Peers connect over TCP, register with arbitrary JSON metadata, receive the
/// current list of peers and are told whenever another peer joins or leaves.
#[derive(Parser, Debug)]
#[command(name = "p2p-tracker")]
#[command(author, version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Print version (full build info with --verbose)
    #[arg(short = 'v', long = "version", action = ArgAction::SetTrue)]
    pub print_version: bool,

    /// Turn on debugging output (-VV for trace)
    #[arg(short = 'V', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Silence any output, overrides verbose
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Port to listen on (default 4100, 0 = any free port)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Path to configuration file
    #[arg(short, long, env = "TRACKER_CONFIG", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for the tracker
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the tracking service (default when no command is given)
    Run,

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration
    Validate,
}

impl Cli {
    /// The command to execute, `run` when none was given
    pub fn resolved_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_to_run() {
        let cli = Cli::parse_from(["p2p-tracker"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.resolved_command(), Commands::Run);
        assert!(cli.port.is_none());
        assert!(!cli.print_version);
    }

    #[test]
    fn test_port_option() {
        let cli = Cli::parse_from(["p2p-tracker", "-p", "5000"]);
        assert_eq!(cli.port, Some(5000));

        let cli = Cli::parse_from(["p2p-tracker", "run", "--port", "0"]);
        assert_eq!(cli.port, Some(0));
        assert_eq!(cli.resolved_command(), Commands::Run);
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Cli::try_parse_from(["p2p-tracker", "--port", "70000"]).is_err());
        assert!(Cli::try_parse_from(["p2p-tracker", "--port", "abc"]).is_err());
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["p2p-tracker", "--config", "/path/to/tracker.toml"]);
        assert_eq!(cli.config, Some("/path/to/tracker.toml".to_string()));
    }

    #[test]
    fn test_version_flag_and_command() {
        let cli = Cli::parse_from(["p2p-tracker", "-v"]);
        assert!(cli.print_version);

        let cli = Cli::parse_from(["p2p-tracker", "version"]);
        assert_eq!(cli.resolved_command(), Commands::Version);
    }

    #[test]
    fn test_verbose_flags() {
        let cli = Cli::parse_from(["p2p-tracker", "-VV"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_quiet_flag() {
        let cli = Cli::parse_from(["p2p-tracker", "run", "--quiet"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_show_with_global_config() {
        let cli = Cli::parse_from(["p2p-tracker", "config", "show", "-c", "t.toml"]);
        assert_eq!(
            cli.resolved_command(),
            Commands::Config {
                subcommand: ConfigSubcommand::Show
            }
        );
        assert_eq!(cli.config.as_deref(), Some("t.toml"));
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["p2p-tracker", "config", "init", "--force"]);
        match cli.resolved_command() {
            Commands::Config {
                subcommand: ConfigSubcommand::Init { path, force },
            } => {
                assert!(path.is_none());
                assert!(force);
            }
            other => panic!("Expected Config Init command, got {:?}", other),
        }
    }
}
