use std::{io::Write, sync::Arc};

use anyhow::{Context, bail};
use clap::Parser;
use conversation::{
    ChannelSink, ConversationHistory, DisplayEntry, EntryKey, ExecutionProcessDirectory,
    HistoricalEntryCache, HistoryConfig, export_to_markdown,
};
use futures::StreamExt;
use logs_client::WsPatchStreamClient;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, prelude::*};
use uuid::Uuid;

mod port_file;
mod transcript;

use transcript::Transcript;

/// Print the conversation of a task attempt from a running server.
#[derive(Parser, Debug)]
#[command(name = "vk-history", version)]
struct Cli {
    /// Task attempt to follow.
    attempt_id: Uuid,
    /// API root of the server. Without it, the port file of the most recently
    /// started server is used, then http://127.0.0.1:3000/api.
    #[arg(long, env = "VIBE_API_URL")]
    base_url: Option<String>,
    /// Keep following after the attempt goes idle.
    #[arg(long)]
    follow: bool,
    /// One JSON object per entry instead of text.
    #[arg(long, conflicts_with = "markdown")]
    json: bool,
    /// Print the conversation once, as markdown, when done.
    #[arg(long)]
    markdown: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_string = format!(
        "warn,vk_history={level},conversation={level},logs_client={level}",
        level = log_level
    );
    let env_filter = EnvFilter::try_new(filter_string).context("invalid RUST_LOG filter")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter),
        )
        .init();

    let base_url =
        port_file::resolve_base_url(cli.base_url.clone(), &std::env::temp_dir()).await;
    let client = Arc::new(
        WsPatchStreamClient::new(&base_url)
            .with_context(|| format!("invalid base url {base_url}"))?,
    );
    let (sink, mut updates) = ChannelSink::new();
    let history = ConversationHistory::new(
        client.clone(),
        Arc::new(HistoricalEntryCache::new()),
        Arc::new(sink),
        HistoryConfig::from_env(),
    )?;
    history.set_attempt(cli.attempt_id);

    let mut processes = client
        .open_directory(cli.attempt_id)
        .await
        .context("failed to open the execution process stream")?;
    info!(attempt_id = %cli.attempt_id, base_url = %client.base_url(), "following attempt");

    let mut directory = ExecutionProcessDirectory::new();
    let mut transcript = Transcript::new(cli.json);
    let mut stdout = std::io::stdout().lock();
    let mut latest: Vec<DisplayEntry> = Vec::new();

    loop {
        tokio::select! {
            msg = processes.next() => {
                let Some(msg) = msg else {
                    bail!("execution process stream closed");
                };
                if directory.apply(&msg?)? {
                    history.sync_directory(&directory)?;
                }
            }
            update = updates.recv() => {
                let Some(update) = update else {
                    bail!("conversation history stopped");
                };
                if !cli.markdown {
                    for line in transcript.update(&update.entries) {
                        writeln!(stdout, "{line}")?;
                    }
                    stdout.flush()?;
                }

                let idle = !update.loading
                    && update
                        .entries
                        .last()
                        .is_some_and(|entry| entry.key == EntryKey::NextAction);
                latest = update.entries;
                if idle && !cli.follow {
                    debug!("attempt is idle");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    if cli.markdown {
        let source = directory
            .visible_processes()
            .iter()
            .find_map(|process| process.executor_action.executor_profile_id())
            .map_or_else(|| "agent".to_string(), |profile| profile.executor.clone());
        let export = export_to_markdown(&latest, &source);
        if export.truncated {
            info!(messages = export.message_count, "older messages left out of the export");
        }
        writeln!(stdout, "{}", export.markdown)?;
        stdout.flush()?;
    }

    Ok(())
}
