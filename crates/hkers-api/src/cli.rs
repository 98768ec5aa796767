//! Command-line interface
//!
//! `serve` runs the HTTP server. `users` is the out-of-band administration
//! path: new accounts start inactive and are activated here.

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use hkers_auth::{LocalAccount, UserDirectory};
use std::io::Write;
use std::path::PathBuf;

/// HKERS API server
///
/// Without a subcommand the server runs, taking the `serve` options at the
/// top level.
#[derive(Parser, Debug, Clone)]
#[command(name = "hkers-api")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQLite database holding the user directory
    #[arg(long, env = "DATABASE_PATH", default_value = "hkers.db", global = true)]
    pub database: PathBuf,

    #[command(flatten)]
    pub serve: ServeArgs,

    /// Command to execute (default: serve)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// The command to run, `serve` when none was given.
    pub fn into_command(self) -> Commands {
        self.command.unwrap_or(Commands::Serve(self.serve))
    }
}

/// Listen address for the HTTP server
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ServeArgs {
    /// Listen address
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port
    #[arg(long, env = "SERVER_PORT", default_value_t = 3000)]
    pub port: u16,
}

/// Top-level commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),

    /// Administer user accounts
    Users {
        #[command(subcommand)]
        command: UserCommand,
    },
}

/// User administration commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// List all accounts
    List,

    /// Show one account
    Show {
        /// User ID
        id: i32,
    },

    /// Approve an account
    Activate {
        /// User ID
        id: i32,
    },

    /// Suspend an account (tokens already issued stay valid until expiry)
    Deactivate {
        /// User ID
        id: i32,
    },
}

fn print_account(out: &mut impl Write, account: &LocalAccount) -> Result<()> {
    writeln!(
        out,
        "{:>6}  {:<8}  {:<24}  {:<32}  {}",
        account.id,
        if account.is_active { "active" } else { "pending" },
        account.username,
        account.email.as_deref().unwrap_or("-"),
        account.oidc_sub
    )?;
    Ok(())
}

/// Execute a user administration command, writing a report to `out`.
pub async fn run_user_command(
    directory: &dyn UserDirectory,
    command: UserCommand,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        UserCommand::List => {
            for account in directory.list().await? {
                print_account(out, &account)?;
            }
        }
        UserCommand::Show { id } => match directory.find_by_id(id).await? {
            Some(account) => print_account(out, &account)?,
            None => bail!("no user with id {}", id),
        },
        UserCommand::Activate { id } => {
            let account = directory.set_active(id, true).await?;
            tracing::info!(user_id = id, "Account activated");
            print_account(out, &account)?;
        }
        UserCommand::Deactivate { id } => {
            let account = directory.set_active(id, false).await?;
            tracing::info!(user_id = id, "Account deactivated");
            print_account(out, &account)?;
        }
    }
    Ok(())
}
