//! OpenSASE Help-Desk CLI
//!
//! Operator tooling for the help-desk rule engine.
//!
//! # Usage
//!
//! ```bash
//! opensase-desk validate -f rules.yaml
//! opensase-desk deadline -f rules.yaml --policy urgent --created 2026-03-06T17:00:00Z
//! opensase-desk simulate -f rules.yaml --tickets tickets.yaml --agents agents.yaml \
//!     --at 2026-03-09T12:00:00Z
//! opensase-desk simulate -f rules.yaml --tickets tickets.yaml --agents agents.yaml \
//!     --event created:T-1
//! opensase-desk config init
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod output;

#[derive(Parser)]
#[command(name = "opensase-desk")]
#[command(author = "OpenSASE")]
#[command(version)]
#[command(about = "OpenSASE help-desk rule engine", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, env = "OPENSASE_DESK_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short)]
    format: Option<output::OutputFormat>,

    /// Profile name from config file
    #[arg(long, short)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a rule catalog
    Validate {
        /// Rule catalog (YAML or JSON)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Compute SLA deadlines for a ticket created at a given instant
    Deadline {
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// SLA policy id; the default policy when omitted
        #[arg(long)]
        policy: Option<String>,
        /// Creation instant (RFC 3339)
        #[arg(long)]
        created: String,
    },
    /// Dry-run the engine against fixture files
    Simulate {
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Ticket snapshots (YAML or JSON list)
        #[arg(long)]
        tickets: PathBuf,
        /// Agent directory fixture (YAML or JSON)
        #[arg(long)]
        agents: PathBuf,
        /// Evaluation instant (RFC 3339), now when omitted
        #[arg(long)]
        at: Option<String>,
        /// Event as `kind:ticket_id`; without events one escalation tick runs
        #[arg(long = "event")]
        events: Vec<String>,
    },
    /// Configure CLI
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default profile
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Set profile value
    Set { key: String, value: String },
    /// Show the profile and the effective engine configuration
    Show,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let profile = match config::Profile::load(cli.profile.as_deref()) {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable CLI profile");
            config::Profile::default()
        }
    };
    let format = cli.format.unwrap_or_else(|| profile.output_format());
    let ctx = commands::Context {
        profile,
        profile_name: cli.profile,
        engine_config: cli.config,
        format,
    };

    let result = match cli.command {
        Commands::Validate { file } => commands::validate::handle(&ctx, file).await,
        Commands::Deadline { file, policy, created } => {
            commands::deadline::handle(&ctx, file, policy, &created).await
        }
        Commands::Simulate {
            file,
            tickets,
            agents,
            at,
            events,
        } => {
            commands::simulate::handle(&ctx, file, &tickets, &agents, at.as_deref(), &events).await
        }
        Commands::Config { action } => commands::config::handle(&ctx, action),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
