//! authsvc CLI - Database migrations and account maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! authsvc-cli migrate
//!
//! # Inspect an account (password hash is never printed)
//! authsvc-cli user show -e a@example.com
//!
//! # Mark an account verified
//! authsvc-cli user verify -e a@example.com
//!
//! # Permanently delete an account
//! authsvc-cli user delete -e a@example.com
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "authsvc-cli")]
#[command(author, version, about = "authsvc CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Inspect and maintain user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Print a user record
    Show {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
    /// Mark a user's email as verified
    Verify {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
    /// Delete a user
    Delete {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Show { email } => commands::user::show(&email).await?,
            UserAction::Verify { email } => commands::user::verify(&email).await?,
            UserAction::Delete { email } => commands::user::delete(&email).await?,
        },
    }
    Ok(())
}
