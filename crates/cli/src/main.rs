//! Dispatch Sync CLI - migrations and operator commands.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! dsync migrate
//!
//! # Fast sync as a staff member
//! dsync sync fast --user 7 --role staff
//!
//! # One-time full-history correction for a manager
//! dsync sync correct --user 1 --role manager
//!
//! # Reconcile one order
//! dsync sync order RY-1001 --user 7
//!
//! # Connect a provider account (password from PROVIDER_PASSWORD)
//! dsync accounts login ali --user 7
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `sync` - Run engine passes in-process
//! - `accounts` - Manage provider accounts

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;

use dispatch_sync_core::{StaffRole, UserId};

mod commands;

#[derive(Parser)]
#[command(name = "dsync")]
#[command(author, version, about = "Dispatch Sync CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Run sync passes
    Sync {
        #[command(subcommand)]
        pass: SyncPass,
    },
    /// Manage provider accounts
    Accounts {
        #[command(subcommand)]
        action: AccountAction,
    },
}

/// Who the command acts as.
#[derive(Args, Clone, Copy)]
struct ActorArgs {
    /// Acting staff member id
    #[arg(long)]
    user: UserId,

    /// Acting role (`staff` or `manager`)
    #[arg(long, default_value = "staff")]
    role: StaffRole,
}

#[derive(Subcommand)]
enum SyncPass {
    /// Fast sync followed by the deletion pass
    Fast {
        #[command(flatten)]
        actor: ActorArgs,

        /// Emit status notifications
        #[arg(long)]
        notify: bool,
    },
    /// One-time full-history correction
    Correct {
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Deletion pass over the actor's own orders
    DeletionPass {
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Reconcile one order by tracking key
    Order {
        /// Tracking key
        key: String,

        #[command(flatten)]
        actor: ActorArgs,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// List usable accounts
    List {
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Make an account the default
    SetDefault {
        /// Account username
        username: String,

        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Disconnect an account
    Delete {
        /// Account username
        username: String,

        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Log in and store the account token
    Login {
        /// Account username
        username: String,

        /// Account password
        #[arg(long, env = "PROVIDER_PASSWORD", hide_env_values = true)]
        password: String,

        #[command(flatten)]
        actor: ActorArgs,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load .env before clap reads PROVIDER_PASSWORD
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Sync { pass } => match pass {
            SyncPass::Fast { actor, notify } => {
                commands::sync::fast(actor.into(), notify).await?;
            }
            SyncPass::Correct { actor } => commands::sync::correct(actor.into()).await?,
            SyncPass::DeletionPass { actor } => {
                commands::sync::deletion_pass(actor.into()).await?;
            }
            SyncPass::Order { key, actor } => {
                commands::sync::order(actor.into(), &key).await?;
            }
        },
        Commands::Accounts { action } => match action {
            AccountAction::List { actor } => commands::accounts::list(actor.user).await?,
            AccountAction::SetDefault { username, actor } => {
                commands::accounts::set_default(actor.user, &username).await?;
            }
            AccountAction::Delete { username, actor } => {
                commands::accounts::delete(actor.user, &username).await?;
            }
            AccountAction::Login {
                username,
                password,
                actor,
            } => {
                let password = SecretString::from(password);
                commands::accounts::login(actor.user, &username, &password).await?;
            }
        },
    }
    Ok(())
}

impl From<ActorArgs> for dispatch_sync_server::sync::Actor {
    fn from(args: ActorArgs) -> Self {
        Self::new(args.user, args.role)
    }
}
