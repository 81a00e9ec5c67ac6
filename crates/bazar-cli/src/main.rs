//! Bazar CLI - browse listings, sell, and chat with buyers from the terminal

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::browse::{run_categories, run_list, run_show};
use crate::commands::chat::run_chat;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::contact::{run_contact, run_inbox};
use crate::commands::sell::run_sell;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bazar=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let target = cli.target();

    match cli.command {
        Commands::List { q, json } => run_list(&target, q.as_deref(), json).await,
        Commands::Show { id, json } => run_show(&target, &id, json).await,
        Commands::Categories => {
            run_categories();
            Ok(())
        }
        Commands::Sell(args) => run_sell(&target, args).await,
        Commands::Contact { listing } => run_contact(&target, &listing).await,
        Commands::Inbox { json } => run_inbox(&target, json).await,
        Commands::Chat { conversation, send } => {
            run_chat(&target, &conversation, send.as_deref()).await
        }
        Commands::Auth { command } => run_auth(command, cli.profile.as_deref()).await,
        Commands::Config { command } => run_config(command, cli.profile.as_deref()),
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
    }
}
