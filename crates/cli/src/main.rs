//! Waybill CLI - database migrations.
//!
//! # Usage
//!
//! ```bash
//! # Run shipment database migrations
//! waybill migrate shipments
//!
//! # Run event log database migrations
//! waybill migrate events
//!
//! # Run all database migrations
//! waybill migrate all
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "waybill")]
#[command(author, version, about = "Waybill CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },
}

#[derive(Subcommand)]
enum MigrateTarget {
    /// Run shipment database migrations
    Shipments,
    /// Run event log database migrations
    Events,
    /// Run all database migrations
    All,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::migrate::MigrationError> {
    match cli.command {
        Commands::Migrate { target } => match target {
            MigrateTarget::Shipments => commands::migrate::shipments().await?,
            MigrateTarget::Events => commands::migrate::events().await?,
            MigrateTarget::All => {
                commands::migrate::shipments().await?;
                commands::migrate::events().await?;
            }
        },
    }
    Ok(())
}
