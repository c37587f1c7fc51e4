//! vatp - command-line client for VATP vehicle servers
//!
//! Streams telemetry as an OBSERVER, or drives the vehicle as an ADMIN from
//! a REPL or one-shot commands.

mod commands;
mod config;
mod repl;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use config::Config;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vatp_client::{AuthMode, Command as DriveCommand, TokenPolicy};

#[derive(Parser)]
#[command(name = "vatp")]
#[command(about = "Command-line client for VATP vehicle servers")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "VATP_CONFIG")]
    config: Option<PathBuf>,

    /// Server address (overrides config and VATP_SERVER)
    #[arg(short, long)]
    server: Option<SocketAddr>,

    /// Connect timeout in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Request timeout in seconds for ADMIN round trips
    #[arg(long)]
    request_timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream telemetry as an OBSERVER until the server closes or Ctrl+C
    Observe {
        /// Observer username
        #[arg(short, long)]
        username: Option<String>,

        /// Print each message as a JSON line, with telemetry fields parsed
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive ADMIN session
    Admin {
        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Authenticate, send drive commands in order, then disconnect
    Command {
        #[command(flatten)]
        auth: AuthArgs,

        /// Commands to send (SPEED_UP, SLOW_DOWN, TURN_LEFT, TURN_RIGHT)
        #[arg(required = true)]
        commands: Vec<DriveCommand>,
    },
}

#[derive(Args)]
struct AuthArgs {
    /// Admin username
    #[arg(short, long)]
    username: Option<String>,

    /// Admin password
    #[arg(short, long)]
    password: Option<String>,

    /// Fail when the AUTH response carries no token
    #[arg(long)]
    strict_auth: bool,

    /// Where to look for the session token (substring or header)
    #[arg(long)]
    token_policy: Option<TokenPolicy>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(addr) = self.server {
            config.server.addr = addr;
        }
        if let Some(secs) = self.connect_timeout {
            config.server.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.request_timeout {
            config.server.request_timeout_secs = Some(secs);
        }
    }
}

impl AuthArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(ref username) = self.username {
            config.admin.username = username.clone();
        }
        if let Some(ref password) = self.password {
            config.admin.password = password.clone();
        }
        if self.strict_auth {
            config.admin.auth_mode = AuthMode::Strict;
        }
        if let Some(policy) = self.token_policy {
            config.admin.token_policy = policy;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).map_err(|e| {
        eprintln!("{}: {}", "Config error".red(), e);
        e
    })?;
    cli.apply(&mut config);
    config.validate()?;
    tracing::debug!("configuration: {:?}", config);

    match cli.command {
        Some(Commands::Observe { username, json }) => {
            if let Some(username) = username {
                config.observer.username = username;
            }
            if let Err(e) = commands::observe(&config, json).await {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
        Some(Commands::Admin { auth }) => {
            auth.apply(&mut config);
            repl::run(&config).await?;
        }
        None => {
            repl::run(&config).await?;
        }
        Some(Commands::Command { auth, commands }) => {
            auth.apply(&mut config);
            match commands::send_commands(&config, &commands).await {
                Ok(output) => println!("{}", output),
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
