//! Marketplace CLI - database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! mk-cli migrate
//!
//! # Insert demo products (and fill user 1's cart)
//! mk-cli seed --cart-user 1
//!
//! # Advance an order
//! mk-cli orders transition RE-7K2M-Q9XD-4HNP shipped --note "Dispatched"
//!
//! # Remove expired idempotency records
//! mk-cli idempotency purge
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mk-cli")]
#[command(author, version, about = "Marketplace CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed the catalog with demo products
    Seed {
        /// Also put two demo products in this user's cart
        #[arg(long)]
        cart_user: Option<i32>,
    },
    /// Operator order actions
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
    /// Idempotency record maintenance
    Idempotency {
        #[command(subcommand)]
        action: IdempotencyAction,
    },
}

#[derive(Subcommand)]
enum OrdersAction {
    /// Move an order to a new status
    Transition {
        /// Order number, e.g. RE-7K2M-Q9XD-4HNP
        order_number: String,

        /// Target status (`processing`, `shipped`, `delivered`, `cancelled`, `returned`)
        status: String,

        /// Note recorded in the order timeline
        #[arg(short, long)]
        note: Option<String>,
    },
}

#[derive(Subcommand)]
enum IdempotencyAction {
    /// Delete expired cached checkout responses
    Purge {
        /// Delete every record, not just expired ones
        #[arg(long)]
        all: bool,
    },
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

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { cart_user } => commands::seed::demo(cart_user).await?,
        Commands::Orders { action } => match action {
            OrdersAction::Transition {
                order_number,
                status,
                note,
            } => commands::orders::transition(&order_number, &status, note).await?,
        },
        Commands::Idempotency { action } => match action {
            IdempotencyAction::Purge { all } => commands::idempotency::purge(all).await?,
        },
    }
    Ok(())
}
