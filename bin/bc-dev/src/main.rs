//! Broadcaster Development Runner
//!
//! Runs one `/broadcast` command against:
//! - an in-memory recipient directory (seed file or generated recipients)
//! - a simulated delivery provider with fault injection
//! - a console operator channel
//!
//! Cancel with Ctrl-C or `--cancel-after-ms`.

mod simulated;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use bc_common::{RecipientId, SourceMessage};
use bc_config::ConfigLoader;
use bc_dispatch::{
    BroadcastCommands, BroadcastDispatcher, CommandInvocation, InMemoryDirectory, OperatorChannel,
};

use simulated::{ConsoleChannel, FaultProfile, SimulatedProvider};

/// Broadcaster Development Runner
#[derive(Parser, Debug)]
#[command(name = "bc-dev")]
#[command(about = "Run a broadcast against in-memory recipients and a simulated provider")]
struct Args {
    /// Command flags, e.g. "-copy -limit 100 -delay 50ms"
    #[arg(long, env = "BC_DEV_ARGS", default_value = "", allow_hyphen_values = true)]
    args: String,

    /// Config file path
    #[arg(long, env = "BROADCAST_CONFIG")]
    config: Option<PathBuf>,

    /// JSON seed file ({"users": [..], "chats": [..]}); overrides the configured one
    #[arg(long)]
    seed_file: Option<String>,

    /// Users to generate when no seed file is given
    #[arg(long, env = "BC_DEV_USERS", default_value = "50")]
    users: i64,

    /// Groups to generate when no seed file is given
    #[arg(long, env = "BC_DEV_GROUPS", default_value = "5")]
    groups: i64,

    /// Channels to generate when no seed file is given
    #[arg(long, env = "BC_DEV_CHANNELS", default_value = "2")]
    channels: i64,

    /// Write the directory as it stands after the run to this seed file
    #[arg(long)]
    write_seed: Option<PathBuf>,

    /// Run the command as if it did not reply to a message
    #[arg(long, default_value = "false")]
    without_source: bool,

    /// Cancel the broadcast after this many milliseconds
    #[arg(long, env = "BC_DEV_CANCEL_AFTER_MS")]
    cancel_after_ms: Option<u64>,

    /// Probability of a terminal delivery error
    #[arg(long, env = "BC_DEV_FAILURE_RATE", default_value = "0.05")]
    failure_rate: f64,

    /// Probability of a rate-limit signal
    #[arg(long, env = "BC_DEV_RATE_LIMIT_RATE", default_value = "0.02")]
    rate_limit_rate: f64,

    /// Wait carried by simulated rate-limit signals, in seconds
    #[arg(long, env = "BC_DEV_FLOOD_WAIT_SECS", default_value = "1")]
    flood_wait_secs: u64,

    /// Maximum simulated delivery latency
    #[arg(long, env = "BC_DEV_MAX_LATENCY_MS", default_value = "20")]
    max_latency_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    bc_common::logging::init_logging("bc-dev");

    let args = Args::parse();
    info!("Starting Broadcaster dev runner");

    let loader = match &args.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load().context("Failed to load configuration")?;

    let seed_file = args.seed_file.clone().or_else(|| config.directory.seed_file.clone());
    let directory = match seed_file {
        Some(path) => {
            info!(path = %path, "Seeding directory from file");
            InMemoryDirectory::from_seed_file(&path)?
        }
        None => generate_directory(&args, config.broadcast.channel_id_threshold),
    };
    let directory = Arc::new(directory);
    info!(
        users = directory.user_count(),
        chats = directory.chat_count(),
        "Directory ready"
    );

    let provider = Arc::new(SimulatedProvider::new(FaultProfile {
        failure_rate: args.failure_rate,
        rate_limit_rate: args.rate_limit_rate,
        flood_wait_secs: args.flood_wait_secs,
        max_latency_ms: args.max_latency_ms,
    }));

    let dispatcher = Arc::new(BroadcastDispatcher::new(
        config.broadcast.clone(),
        directory.clone(),
        provider,
    ));
    let commands = Arc::new(BroadcastCommands::new(dispatcher));
    let channel: Arc<dyn OperatorChannel> = Arc::new(ConsoleChannel::new());

    let source = (!args.without_source).then(|| SourceMessage::new(-1, 1));
    let invocation = CommandInvocation::new(source, args.args.clone());

    let run = {
        let commands = commands.clone();
        let channel = channel.clone();
        tokio::spawn(async move { commands.handle_broadcast(invocation, channel).await })
    };

    let cancel_after = args.cancel_after_ms.map(Duration::from_millis);
    let watcher = {
        let commands = commands.clone();
        let channel = channel.clone();
        tokio::spawn(async move {
            let timer = async {
                match cancel_after {
                    Some(after) => tokio::time::sleep(after).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = timer => info!("Cancel timer elapsed"),
                result = signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to listen for Ctrl-C");
                        return;
                    }
                    info!("Ctrl-C received");
                }
            }
            commands.handle_cancel(channel).await;
        })
    };

    let flow = run.await.context("Broadcast task failed")?;
    watcher.abort();
    info!(?flow, "Command handled");

    if let Some(path) = &args.write_seed {
        write_seed(&directory, path).await?;
    }

    info!(
        users = directory.user_count(),
        chats = directory.chat_count(),
        "Directory after run"
    );
    Ok(())
}

/// Users get small positive ids, groups small negative ids, channels ids past the threshold
fn generate_directory(args: &Args, channel_threshold: i64) -> InMemoryDirectory {
    let users = (1..=args.users).map(|i| RecipientId(100_000 + i));
    let groups = (1..=args.groups).map(|i| RecipientId(-(4_000 + i)));
    let channels = (1..=args.channels).map(|i| RecipientId(-(channel_threshold.saturating_add(i))));

    info!(
        users = args.users,
        groups = args.groups,
        channels = args.channels,
        "Generating recipients"
    );
    InMemoryDirectory::with_recipients(users, groups.chain(channels))
}

async fn write_seed(directory: &InMemoryDirectory, path: &Path) -> Result<()> {
    use bc_dispatch::RecipientDirectory;

    let seed = serde_json::json!({
        "users": directory.list_users().await?,
        "chats": directory.list_chats().await?,
    });
    let content = serde_json::to_string_pretty(&seed)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write seed file {}", path.display()))?;
    info!(path = %path.display(), "Wrote seed file");
    Ok(())
}
