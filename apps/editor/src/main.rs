use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use calcsheet_client::HttpBackend;
use calcsheet_lock::{LockService, MemoryTabStorage, SessionIdentity};
use calcsheet_model::{derive_ports, Session, SheetId, VersionId};
use calcsheet_versions::SheetSource;
use clap::{Parser, Subcommand};
use editor::EditorConfig;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Command-line client for a calcsheet server.
#[derive(Parser)]
#[command(name = "calcsheet", about = "Inspect and manage calcsheet locks and versions.")]
struct Args {
    /// JSON config file (defaults apply to anything it omits).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Server base URL. Overrides the config file and CALCSHEET_SERVER.
    #[arg(long, global = true)]
    server: Option<String>,

    /// User id for lock requests. Overrides the config file and CALCSHEET_USER.
    #[arg(long, global = true)]
    user: Option<String>,

    /// Tab id to act as (e.g. to release a lock taken by an earlier invocation).
    #[arg(long, global = true)]
    tab: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Edit lock operations.
    Lock {
        #[command(subcommand)]
        action: LockAction,
    },
    /// Version snapshots of a sheet.
    Versions {
        #[command(subcommand)]
        action: VersionAction,
    },
    /// Print the ports a nested reference to SHEET would expose.
    Ports {
        sheet: String,
        /// Use this version instead of the live draft.
        #[arg(long)]
        version: Option<String>,
    },
}

#[derive(Subcommand)]
enum LockAction {
    Status { sheet: String },
    Acquire { sheet: String },
    Takeover { sheet: String },
    Release { sheet: String },
}

#[derive(Subcommand)]
enum VersionAction {
    List {
        sheet: String,
    },
    Show {
        sheet: String,
        version: String,
    },
    Create {
        sheet: String,
        tag: String,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Released<'a> {
    sheet_id: &'a SheetId,
    released: bool,
}

fn load_config(args: &Args) -> Result<EditorConfig> {
    let mut config = match &args.config {
        Some(path) => EditorConfig::from_file(path)?,
        None => EditorConfig::default(),
    }
    .with_env_overrides(|key| std::env::var(key).ok());
    if let Some(server) = &args.server {
        config.server_url = Some(server.clone());
    }
    if let Some(user) = &args.user {
        config.user_id = Some(user.clone());
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &EditorConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(config.level_filter()?.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn session(config: &EditorConfig, tab: Option<&str>) -> Result<Session> {
    let user = config
        .user_id
        .clone()
        .context("no user configured (set CALCSHEET_USER or pass --user)")?;
    Ok(match tab {
        Some(tab) => Session::new(user, tab),
        None => SessionIdentity::derive(user, &mut MemoryTabStorage::default()).into_session(),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value)?;
    handle.write_all(b"\n")?;
    Ok(())
}

async fn run_lock(backend: &HttpBackend, config: &EditorConfig, tab: Option<&str>, action: LockAction) -> Result<()> {
    match action {
        LockAction::Status { sheet } => {
            let lock = backend.peek(&SheetId::new(sheet)).await?;
            print_json(&lock)
        }
        LockAction::Acquire { sheet } => {
            let lock = backend.acquire(&SheetId::new(sheet), &session(config, tab)?).await?;
            print_json(&lock)
        }
        LockAction::Takeover { sheet } => {
            let lock = backend
                .take_over(&SheetId::new(sheet), &session(config, tab)?)
                .await?;
            print_json(&lock)
        }
        LockAction::Release { sheet } => {
            let sheet = SheetId::new(sheet);
            backend.release(&sheet, &session(config, tab)?).await?;
            print_json(&Released {
                sheet_id: &sheet,
                released: true,
            })
        }
    }
}

async fn run_versions(backend: &HttpBackend, action: VersionAction) -> Result<()> {
    match action {
        VersionAction::List { sheet } => {
            let versions = backend.list_versions(&SheetId::new(sheet)).await?;
            print_json(&versions)
        }
        VersionAction::Show { sheet, version } => {
            let snapshot = backend
                .fetch_version(&SheetId::new(sheet), &VersionId::new(version))
                .await?;
            print_json(&snapshot)
        }
        VersionAction::Create {
            sheet,
            tag,
            description,
        } => {
            let created = backend
                .create_version(&SheetId::new(sheet), &tag, description.as_deref())
                .await?;
            print_json(&created.summary(false))
        }
    }
}

async fn run_ports(backend: &HttpBackend, sheet: String, version: Option<String>) -> Result<()> {
    let sheet = SheetId::new(sheet);
    let nodes = match version {
        Some(version) => backend.fetch_version(&sheet, &VersionId::new(version)).await?.nodes,
        None => backend.fetch_sheet(&sheet).await?.nodes,
    };
    print_json(&derive_ports(&nodes))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&config)?;

    let backend = HttpBackend::new(config.server_url()?)?;
    tracing::debug!(server = %backend.base_url(), "using server");

    let tab = args.tab.as_deref();
    match args.command {
        Command::Lock { action } => run_lock(&backend, &config, tab, action).await,
        Command::Versions { action } => run_versions(&backend, action).await,
        Command::Ports { sheet, version } => run_ports(&backend, sheet, version).await,
    }
}
