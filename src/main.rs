use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use channel_sync::common::{ChannelRef, Message, MessageKind, ViewUpdate};
use channel_sync::config;
use channel_sync::storage::{Backend, SqliteStore};
use channel_sync::sync::{ChannelSession, MessageFeed};
use channel_sync::SyncError;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;

/// How long `history` waits for the initial replay to go quiet.
const SETTLE_TIMEOUT: Duration = Duration::from_millis(300);

#[derive(Parser)]
#[command(
    name = "channel-sync",
    version,
    about = "Channel message sync over a local SQLite store"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Channel identifier
    #[arg(long)]
    channel: String,
    /// Channel display name
    #[arg(long, default_value = "general")]
    channel_name: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a text message
    Send { text: String },
    /// Upload an image and send it as a photo message
    SendPhoto { path: String },
    /// Print the ordered message history
    History,
    /// Print messages as they arrive until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let app_config = config::load_with_identity(&cli.config);
    let store = Arc::new(SqliteStore::open(
        &app_config.database_path,
        app_config.blob_base_url.clone(),
    )?);
    let backend = Backend::new(store.clone(), store);
    let channel = ChannelRef::new(cli.channel, cli.channel_name);

    let mut session = match ChannelSession::open(channel, backend, &app_config).await {
        Ok(session) => session,
        Err(SyncError::NoChannelIdentifier) => {
            return Err("channel has not been created yet".into());
        }
        Err(err) => return Err(err.into()),
    };

    match cli.command {
        Command::Send { text } => {
            let sent = session.composer().send_text(&text)?;
            let id = sent.write.await??;
            println!("sent {id}");
        }
        Command::SendPhoto { path } => {
            let bytes = tokio::fs::read(&path).await?;
            let message = session.composer().send_photo(bytes).await?;
            println!("sent photo {}", message.id.unwrap_or_default());
        }
        Command::History => {
            while let Ok(Some(_)) = tokio::time::timeout(SETTLE_TIMEOUT, session.next_update()).await {}
            for message in session.messages().iter() {
                println!("{}", render_line(&session, message));
            }
        }
        Command::Watch => loop {
            tokio::select! {
                update = session.next_update() => match update {
                    Some(ViewUpdate::Inserted { message, is_last }) => {
                        let marker = if is_last { "" } else { " (earlier)" };
                        println!("{}{marker}", render_line(&session, &message));
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received shutdown signal, closing channel view...");
                    break;
                }
            }
        },
    }

    session.stop();
    Ok(())
}

fn render_line(session: &ChannelSession, message: &Message) -> String {
    let who = if session.is_from_current_sender(message) {
        "me".to_string()
    } else {
        message.sender.display_name.clone()
    };
    let body = match &message.kind {
        MessageKind::Text(content) => content.clone(),
        MessageKind::Photo(Some(url)) => format!("[photo] {url}"),
        MessageKind::Photo(None) => "[photo]".to_string(),
    };
    format!("[{}] {who}: {body}", message.sent_at.format("%Y-%m-%d %H:%M:%S"))
}
