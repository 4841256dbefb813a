//! wapploxx: command-line client for WAppLoxx controllers
//!
//! Every command logs in, does its work and logs out again, so it never
//! leaves a session behind that would lock out the next login. Results are
//! printed to stdout as JSON; logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{Value, json};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use wapploxx_core::{
    Config, Controller, EventLogKind, EventLogQuery, FanOutError, Lock, Locks, Panel,
};

#[derive(Parser)]
#[command(name = "wapploxx")]
#[command(about = "Control smartlocks and the alarm panel of a WAppLoxx controller")]
struct Cli {
    /// Path to the TOML configuration file (default: the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Controller base URL, e.g. https://192.168.0.10
    #[arg(long)]
    url: Option<String>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,

    /// Try to log in even while a previous IP block is remembered
    #[arg(long)]
    ignore_ip_block: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Controller system status and panel status
    Status,
    /// Profile of the logged-in user
    User,
    /// Locks visible to the account
    Locks,
    /// Open a lock (start remote access)
    Open { id: u32 },
    /// Close a lock (stop remote access)
    Close { id: u32 },
    /// Open every lock
    OpenAll,
    /// Close every lock
    CloseAll,
    /// Show the panel status, or arm/disarm the panel
    Panel {
        #[arg(value_enum)]
        action: Option<PanelCommand>,
    },
    /// Read a page of the event log
    Events {
        #[arg(long, default_value_t = 0)]
        index: u32,
        #[arg(long, default_value_t = 50)]
        count: u32,
        /// all, access, arm-disarm, record or system
        #[arg(long = "type", default_value = "all")]
        kind: EventLogKind,
        /// Only events for the lock with this name
        #[arg(long)]
        lock: Option<String>,
        /// Only events for the lock with this id
        #[arg(long)]
        lock_id: Option<u32>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PanelCommand {
    Arm,
    Disarm,
    ForceDisarm,
}

#[derive(Serialize)]
struct FanOutReport<'a> {
    locks: &'a Locks,
    failed: Vec<FailedLock>,
}

#[derive(Serialize)]
struct FailedLock {
    id: u32,
    error: String,
}

impl<'a> FanOutReport<'a> {
    fn new(locks: &'a Locks, outcome: std::result::Result<(), FanOutError>) -> Self {
        let failed = match outcome {
            Ok(()) => Vec::new(),
            Err(e) => e
                .failures
                .into_iter()
                .map(|(id, err)| FailedLock {
                    id,
                    error: err.to_string(),
                })
                .collect(),
        };
        Self { locks, failed }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "wapploxx=info,wapploxx_core=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };
    apply_overrides(&mut config, &cli);

    if config.controller.url.is_empty() {
        anyhow::bail!("No controller URL configured (use --url or the config file)");
    }

    let pause_auto_logout = config.controller.pause_auto_logout;
    let mut controller = Controller::from_config(&config.controller)?;

    tracing::debug!(url = %controller.credentials().base_url, "using controller");

    let output = controller
        .with_session(cli.ignore_ip_block, async |c: &mut Controller| {
            execute(c, &cli.command, pause_auto_logout).await
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&output)?);

    if output
        .get("failed")
        .and_then(Value::as_array)
        .is_some_and(|failed| !failed.is_empty())
    {
        anyhow::bail!("Some locks failed");
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    let controller = &mut config.controller;

    if let Some(url) = &cli.url {
        controller.url = url.clone();
    }
    if let Some(username) = &cli.username {
        controller.username = username.clone();
    }
    if let Some(password) = &cli.password {
        controller.password = password.clone();
    }
    if cli.insecure {
        controller.verify_tls = false;
    }
}

async fn execute(c: &mut Controller, command: &Command, pause_auto_logout: bool) -> wapploxx_core::Result<Value> {
    let value = match command {
        Command::Status => {
            let system = c.get_system_status(pause_auto_logout).await?;
            let panel = c.get_panel_status().await?;
            json!({ "system": system, "panel": panel })
        }
        Command::User => serde_json::to_value(c.get_user_info().await?)?,
        Command::Locks => serde_json::to_value(Locks::fetch(c).await?)?,
        Command::Open { id } => {
            let mut lock = Lock::fetch(c, *id).await?;
            lock.open(c).await?;
            serde_json::to_value(&lock)?
        }
        Command::Close { id } => {
            let mut lock = Lock::fetch(c, *id).await?;
            lock.close(c).await?;
            serde_json::to_value(&lock)?
        }
        Command::OpenAll => {
            let mut locks = Locks::fetch(c).await?;
            let outcome = locks.open_all(c).await;
            serde_json::to_value(FanOutReport::new(&locks, outcome))?
        }
        Command::CloseAll => {
            let mut locks = Locks::fetch(c).await?;
            let outcome = locks.close_all(c).await;
            serde_json::to_value(FanOutReport::new(&locks, outcome))?
        }
        Command::Panel { action } => {
            let mut panel = Panel::new();
            match action {
                Some(PanelCommand::Arm) => panel.arm(c).await?,
                Some(PanelCommand::Disarm) => panel.disarm(c).await?,
                Some(PanelCommand::ForceDisarm) => panel.force_disarm(c).await?,
                None => {}
            }
            serde_json::to_value(panel.status(c).await?)?
        }
        Command::Events {
            index,
            count,
            kind,
            lock,
            lock_id,
        } => {
            let query = EventLogQuery {
                index: *index,
                count: *count,
                kind: *kind,
                lock: lock.clone(),
                lock_id: *lock_id,
            };
            serde_json::to_value(c.get_event_log(&query).await?)?
        }
    };

    Ok(value)
}
