//! Command-line front end for the Memoix sync engine.
//!
//! Every invocation restores the persisted connection, runs one command and
//! exits. Output is returned as text so it can be tested without a terminal.

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use memoix_store::{LocalStore, SettingsStore, SqliteStore};
use memoix_sync::cloud::{
    FolderConfig, FolderProvider, GoogleDriveConfig, GoogleDriveProvider, ProviderRegistry,
};
use memoix_sync::{
    PullOutcome, PushOutcome, RepositorySwitcher, SkipReason, SyncConfig, SyncCoordinator,
    SyncNotice,
};
use memoix_types::{ProviderKind, Repository, RepositoryId, SyncMode};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "memoix-sync")]
#[command(about = "Sync Memoix collections with a cloud folder")]
pub struct Cli {
    /// Path to the local database
    #[arg(long, env = "MEMOIX_DB", default_value = "memoix.db")]
    pub db: PathBuf,

    /// Device name recorded in pushed bundles
    #[arg(long, env = "MEMOIX_DEVICE", default_value = "memoix-cli")]
    pub device: String,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(flatten)]
    pub drive: DriveArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Google Drive credentials. Drive is only registered when a client id is
/// given.
#[derive(Args, Debug, Default)]
pub struct DriveArgs {
    #[arg(long, env = "MEMOIX_DRIVE_CLIENT_ID", hide_env_values = true)]
    pub drive_client_id: Option<String>,

    #[arg(long, env = "MEMOIX_DRIVE_CLIENT_SECRET", hide_env_values = true)]
    pub drive_client_secret: Option<String>,

    /// Refresh token from an earlier sign-in
    #[arg(long, env = "MEMOIX_DRIVE_REFRESH_TOKEN", hide_env_values = true)]
    pub drive_refresh_token: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the connection, sync mode and last sync time
    Status,
    /// Upload the local collections
    Push,
    /// Download and merge the remote collections
    Pull,
    /// Set the sync mode
    Mode { mode: SyncMode },
    /// Manage configured repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum RepoCommand {
    /// List configured repositories
    List,
    /// Add a repository
    Add {
        name: String,
        /// `local_folder` or `google_drive`
        provider: ProviderKind,
        /// Folder path or Drive folder id
        folder: String,
        /// Switch to the new repository right away
        #[arg(long)]
        activate: bool,
    },
    /// Make a repository the active one
    Switch { id: RepositoryId },
    /// Remove a repository
    Remove { id: RepositoryId },
    /// Check that a repository's folder is reachable
    Verify { id: RepositoryId },
}

/// Builds the provider registry from the command-line configuration.
pub fn build_registry(drive: &DriveArgs) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new()
        .with_provider(Arc::new(FolderProvider::new(FolderConfig::default())));

    if let Some(client_id) = &drive.drive_client_id {
        let provider = GoogleDriveProvider::new(GoogleDriveConfig {
            client_id: client_id.clone(),
            client_secret: drive.drive_client_secret.clone().unwrap_or_default(),
            ..Default::default()
        })
        .context("Failed to create Google Drive provider")?;
        if let Some(refresh) = &drive.drive_refresh_token {
            // The access token is fetched on initialize.
            provider.set_tokens(String::new(), Some(refresh.clone()));
        }
        registry.register(Arc::new(provider));
    }
    Ok(registry)
}

/// The engine components one invocation works with.
pub struct App {
    coordinator: SyncCoordinator,
    switcher: RepositorySwitcher,
}

impl App {
    /// Opens the database named on the command line and restores the
    /// persisted connection.
    pub async fn open(cli: &Cli) -> Result<Self> {
        let store = SqliteStore::open(&cli.db)
            .with_context(|| format!("Failed to open database {}", cli.db.display()))?;
        let registry = build_registry(&cli.drive)?;
        Ok(Self::with_parts(SyncConfig::for_device(&cli.device), registry, Arc::new(store)).await)
    }

    pub async fn with_parts<S>(config: SyncConfig, registry: ProviderRegistry, store: Arc<S>) -> Self
    where
        S: LocalStore + SettingsStore + 'static,
    {
        let registry = Arc::new(registry);
        let coordinator = SyncCoordinator::new(config, registry.clone(), store.clone(), store);
        coordinator.initialize().await;
        let switcher = RepositorySwitcher::new(registry, coordinator.settings().clone());
        Self {
            coordinator,
            switcher,
        }
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub async fn run(&self, command: &Command) -> Result<String> {
        match command {
            Command::Status => self.status().await,
            Command::Push => self.push().await,
            Command::Pull => self.pull().await,
            Command::Mode { mode } => {
                self.coordinator.set_sync_mode(*mode).await?;
                Ok(format!("Sync mode set to {mode}"))
            }
            Command::Repo { command } => self.repo(command).await,
        }
    }

    async fn status(&self) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "Device:      {}", self.coordinator.config().device_name)?;
        match self.coordinator.registry().active() {
            Some(provider) => writeln!(
                out,
                "Provider:    {} ({})",
                provider.name(),
                provider.connected_path().unwrap_or_default()
            )?,
            None => writeln!(out, "Provider:    not connected")?,
        }
        writeln!(out, "Mode:        {}", self.coordinator.sync_mode())?;
        writeln!(
            out,
            "Last synced: {}",
            format_time(self.coordinator.last_synced_at().await?)
        )?;
        match self.switcher.active_repository().await? {
            Some(repo) => write!(out, "Repository:  {} ({})", repo.name, repo.id)?,
            None => write!(out, "Repository:  none")?,
        }
        Ok(out)
    }

    async fn push(&self) -> Result<String> {
        let mut notices = self.coordinator.subscribe_notices();
        let outcome = self.coordinator.push(false).await;
        let message = drain(&mut notices);
        match outcome {
            PushOutcome::Pushed(meta) => {
                self.record_sync(meta.timestamp).await?;
                Ok(message)
            }
            PushOutcome::AlreadyRunning => Ok("A push is already running".to_string()),
            PushOutcome::NotConnected | PushOutcome::Failed(_) => Err(anyhow!(message)),
        }
    }

    async fn pull(&self) -> Result<String> {
        let mut notices = self.coordinator.subscribe_notices();
        let outcome = self.coordinator.pull(false).await;
        let message = drain(&mut notices);
        match outcome {
            PullOutcome::Merged(_) => {
                let at = self.coordinator.last_synced_at().await?.unwrap_or_else(Utc::now);
                self.record_sync(at).await?;
                Ok(message)
            }
            PullOutcome::Skipped(SkipReason::NotConnected) => {
                bail!("Connect a sync location first")
            }
            PullOutcome::Skipped(_) => Ok(message),
            PullOutcome::Failed(_) => Err(anyhow!(message)),
        }
    }

    async fn record_sync(&self, at: DateTime<Utc>) -> Result<()> {
        if let Some(repo) = self.switcher.active_repository().await? {
            self.switcher.update_last_synced(repo.id, at).await?;
            debug!(repository = %repo.name, "Recorded last sync");
        }
        Ok(())
    }

    async fn repo(&self, command: &RepoCommand) -> Result<String> {
        match command {
            RepoCommand::List => {
                let repositories = self.switcher.repositories().await?;
                if repositories.is_empty() {
                    return Ok("No repositories configured".to_string());
                }
                Ok(repositories
                    .iter()
                    .map(describe)
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            RepoCommand::Add {
                name,
                provider,
                folder,
                activate,
            } => {
                let repo = self
                    .switcher
                    .add_repository(name.as_str(), *provider, folder.as_str(), false)
                    .await?;
                if *activate {
                    self.switcher
                        .set_active_repository(repo.id)
                        .await
                        .with_context(|| format!("Added {} but could not activate it", repo.name))?;
                    return Ok(format!("Added and switched to {} ({})", repo.name, repo.id));
                }
                Ok(format!("Added {} ({})", repo.name, repo.id))
            }
            RepoCommand::Switch { id } => {
                let repo = self.switcher.set_active_repository(*id).await?;
                Ok(format!("Switched to {}", repo.name))
            }
            RepoCommand::Remove { id } => {
                let repo = self.switcher.remove_repository(*id).await?;
                if repo.is_active {
                    return Ok(format!("Removed {} and disconnected", repo.name));
                }
                Ok(format!("Removed {}", repo.name))
            }
            RepoCommand::Verify { id } => {
                let repo = self.switcher.verify_repository(*id).await?;
                Ok(format!("{} is reachable", repo.name))
            }
        }
    }
}

fn drain(notices: &mut broadcast::Receiver<SyncNotice>) -> String {
    let mut messages = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        messages.push(notice.message);
    }
    messages.join("\n")
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "never".to_string(), |at| at.to_rfc3339())
}

fn describe(repo: &Repository) -> String {
    let marker = if repo.is_active { '*' } else { ' ' };
    let mut line = format!(
        "{marker} {}  {}  [{}] {}",
        repo.id, repo.name, repo.provider, repo.folder_id
    );
    if repo.access_denied {
        line.push_str("  (access denied)");
    } else if repo.is_pending_verification {
        line.push_str("  (unverified)");
    }
    if let Some(at) = repo.last_synced {
        let _ = write!(line, "  synced {}", at.to_rfc3339());
    }
    line
}
