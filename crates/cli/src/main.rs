//! Taproom CLI - Access auditing tools.
//!
//! # Usage
//!
//! ```bash
//! # List every view and its required access level
//! tap-cli views
//!
//! # Sign in as an account and report which views it can reach
//! tap-cli audit -e bartender@example.com -p secret
//! ```
//!
//! # Environment Variables
//!
//! - `SUPABASE_URL` - Hosted project base URL
//! - `SUPABASE_ANON_KEY` - Public anon API key

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "tap-cli")]
#[command(author, version, about = "Taproom CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every view and its required access level
    Views,
    /// Sign in as an account and report which views it can reach
    Audit {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Views => commands::views::list(),
        Commands::Audit { email, password } => {
            commands::audit::run(&email, &password).await?;
        }
    }
    Ok(())
}
