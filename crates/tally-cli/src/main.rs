//! Tally CLI - Invoice-driven personal spending tracker
//!
//! Usage:
//!   tally init                          Initialize database
//!   tally users add NAME EMAIL          Create a user
//!   tally process invoice.png --user N  Extract an invoice and store it
//!   tally serve --port 3000             Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Serve {
            port,
            host,
            uploads_dir,
            static_dir,
            allowed_origins,
            session_ttl_hours,
            secure_cookies,
        } => {
            let config = tally_server::ServerConfig {
                allowed_origins,
                session_ttl_hours,
                secure_cookies,
            };
            commands::cmd_serve(
                &cli.db,
                &host,
                port,
                cli.no_encrypt,
                uploads_dir,
                static_dir.as_deref(),
                config,
            )
            .await
        }
        Commands::Process {
            image,
            user,
            uploads_dir,
        } => {
            commands::cmd_process(&cli.db, &image, user.as_deref(), cli.no_encrypt, uploads_dir)
                .await
        }
        Commands::Users { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                UsersAction::Add {
                    username,
                    email,
                    password,
                } => {
                    let password = match password {
                        Some(p) => p,
                        None => commands::password_from_env()?,
                    };
                    commands::cmd_users_add(&db, &username, &email, &password)
                }
                UsersAction::List => commands::cmd_users_list(&db),
            }
        }
        Commands::Transactions { user, page } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_transactions_list(&db, &user, page)
        }
        Commands::Advice { user } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_advice(&db, &user)
        }
    }
}
