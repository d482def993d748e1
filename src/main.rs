//! issuesync - webhook-driven issue synchronization
//!
//! Main entry point for the issuesync CLI.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use issuesync::config::SyncConfig;
use issuesync::model::{IntegrationAccount, IntegrationSettings, IssueId, Provider};
use issuesync::server::SyncServer;
use issuesync::storage::Store;
use std::path::PathBuf;

/// issuesync - keep issues in sync with chat and code hosting
#[derive(Parser, Debug)]
#[command(name = "issuesync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/issuesync/config.yaml)
    #[arg(short, long, env = "ISSUESYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Run the webhook server
    Serve {
        /// Listen address, overrides server.bind
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Manage integration accounts
    #[command(subcommand)]
    Account(AccountCommands),

    /// Print the audit history of an issue as JSON
    History {
        /// Issue ID
        issue_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum AccountCommands {
    /// Register (or update) an integration account
    Add {
        /// Provider (slack, github)
        provider: String,

        /// Team id (Slack) or installation id (GitHub)
        external_workspace_id: String,

        /// Owning workspace
        workspace: String,

        /// Settings document (JSON)
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },

    /// List registered accounts
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = issuesync::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(SyncConfig::default_path);

    match cli.command {
        Commands::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            SyncConfig::default().save(&config_path)?;
            println!("Wrote {}", config_path.display());
        }
        Commands::Serve { bind } => {
            let config = load_config(&config_path)?;
            config.validate().context("invalid configuration")?;
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());

            tracing::info!(
                database = %config.database.path.display(),
                mode = ?config.sync.mode,
                "Starting issuesync"
            );
            SyncServer::from_config(&config)?.run(&bind).await?;
        }
        Commands::Account(AccountCommands::Add {
            provider,
            external_workspace_id,
            workspace,
            settings,
        }) => {
            let config = load_config(&config_path)?;
            let provider: Provider = provider.parse()?;
            let settings = match settings {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("cannot read {}", path.display()))?;
                    let value: serde_json::Value = serde_json::from_str(&raw)
                        .with_context(|| format!("{} is not JSON", path.display()))?;
                    IntegrationSettings::from_json(&value)?
                }
                None => IntegrationSettings::default(),
            };

            let store = Store::open(&config.database.path, config.database.wal_mode)?;
            let account =
                IntegrationAccount::new(provider, external_workspace_id, workspace, settings);
            store.save_account(&account)?;
            let saved = store
                .find_account(provider, &account.external_workspace_id)?
                .context("account was not saved")?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }
        Commands::Account(AccountCommands::List) => {
            let config = load_config(&config_path)?;
            let store = Store::open(&config.database.path, config.database.wal_mode)?;
            println!("{}", serde_json::to_string_pretty(&store.accounts()?)?);
        }
        Commands::History { issue_id } => {
            let config = load_config(&config_path)?;
            let store = Store::open(&config.database.path, config.database.wal_mode)?;
            let entries = issuesync::history::entries(store.conn(), &IssueId::new(issue_id))?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }

    Ok(())
}

fn load_config(path: &std::path::Path) -> anyhow::Result<SyncConfig> {
    if !path.exists() {
        bail!(
            "No configuration found at {}. Run 'issuesync init' first.",
            path.display()
        );
    }
    SyncConfig::load(path).with_context(|| format!("cannot load {}", path.display()))
}
