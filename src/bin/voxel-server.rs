//! voxel-server - classic voxel world server
//!
//! Loads a TOML configuration (or the defaults), installs logging, binds the
//! listener and serves until the console reads `stop`.

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use voxel_protocol::service::{split_command, CommandHandler};
use voxel_protocol::utils::logging::init_logging;
use voxel_protocol::{Result, Server, ServerConfig, Session};

/// Classic voxel world server
#[derive(Parser)]
#[command(name = "voxel-server")]
#[command(version)]
#[command(about = "Serve classic voxel worlds with protocol extensions", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

/// Built-in console commands.
struct Builtins;

impl CommandHandler for Builtins {
    fn handle(&self, server: &Server, caller: Option<&Arc<Session>>, line: &str) -> bool {
        match split_command(line) {
            ("stop", _) if caller.is_none() => {
                server.stop();
                true
            }
            ("list", _) => {
                let names: Vec<String> = server
                    .sessions()
                    .iter()
                    .filter_map(|session| session.name())
                    .collect();
                info!(players = names.len(), "Online: {}", names.join(", "));
                true
            }
            _ => false,
        }
    }
}

fn load_config(cli: &Cli) -> Result<ServerConfig> {
    match &cli.config {
        Some(path) => ServerConfig::from_file(path),
        None => ServerConfig::from_env(),
    }
}

fn serve(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.bind_address()?)?;
    let server = Arc::new(Server::new(config)?.with_command_handler(Builtins));
    server.run(listener)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.print_config {
        match toml::to_string_pretty(&config) {
            Ok(text) => {
                println!("{text}");
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                eprintln!("Failed to render config: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match serve(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
