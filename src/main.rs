//! p2p-tracker - peer-presence tracking service
//!
//! Entry point for the tracker binary: parses the command line, loads the
//! configuration, sets up logging and runs the TCP service until Ctrl+C.

use clap::Parser;
use tracing::info;

use p2p_tracker::cli::{Cli, Commands, ConfigSubcommand};
use p2p_tracker::config::{self, TrackerConfig};
use p2p_tracker::error::{Error, Result};
use p2p_tracker::logging;
use p2p_tracker::tracker::TrackerServer;
use p2p_tracker::version;

fn main() {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    if let Err(e) = dispatch(&cli) {
        exit_with(e);
    }
}

fn dispatch(cli: &Cli) -> Result<()> {
    if cli.print_version {
        if cli.verbose > 0 {
            version::print_version();
        } else {
            version::print_short_version();
        }
        return Ok(());
    }

    match cli.resolved_command() {
        Commands::Version => {
            version::print_version();
            Ok(())
        }
        Commands::Config { subcommand } => {
            // Config commands use minimal logging
            logging::init_simple(tracing::level_filters::LevelFilter::WARN)?;
            handle_config_command(cli, subcommand)
        }
        Commands::Run => run_tracker(cli),
    }
}

/// Load configuration and apply command-line overrides
fn load_config(cli: &Cli) -> Result<TrackerConfig> {
    let mut cfg = TrackerConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        cfg.server.port = port;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Print a formatted error and exit with its category code
fn exit_with(e: Error) -> ! {
    eprint!("{}", e.format_for_terminal());
    std::process::exit(e.exit_code());
}

/// Run the tracking service
fn run_tracker(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting p2p-tracker"
    );

    let worker_threads = if config.server.worker_threads > 0 {
        config.server.worker_threads
    } else {
        num_cpus::get().min(8)
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(worker_threads)
        .thread_name("p2p-tracker")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async {
        let server = TrackerServer::bind(&config.server).await?;

        info!(
            max_connections = config.server.max_connections,
            worker_threads,
            "Accepting peers"
        );

        tokio::select! {
            _ = server.run() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
            }
        }

        Ok::<(), Error>(())
    })
}

/// Handle configuration subcommands
fn handle_config_command(cli: &Cli, subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show => {
            let cfg = load_config(cli)?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", written.display());
        }
        ConfigSubcommand::Validate => {
            load_config(cli)?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
