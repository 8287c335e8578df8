//! tg-file-relay - upload, list and range-stream files through a Telegram chat
//!
//! Serves a small HTTP API that forwards browser uploads to the Bot API,
//! lists files recently seen in the relay chat and streams them back with
//! byte-range support.

mod api;
mod cache;
mod config;
mod listener;
mod telegram;

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use api::AppState;
use cache::{FileRefCache, RecencyCache};
use config::{Cli, Command, Settings};
use listener::UpdateListener;
use telegram::{BotClient, FileUpload, MessagingPlatform, SendKind, UploadTarget};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.settings).await,
        Command::Send { path, caption } => send(cli.settings, &path, caption).await,
    }
}

async fn serve(settings: Settings) -> Result<()> {
    let relay = settings.relay();
    let client = BotClient::new(
        &settings.api_url,
        relay.bot_token.clone(),
        Arc::new(FileRefCache::new()),
    )?;
    let file_refs = Arc::clone(client.file_refs());

    if relay.bot_token.is_none() {
        warn!("BOT_TOKEN not set; streaming and default uploads are disabled");
    } else {
        match client.get_me().await {
            Ok(me) => info!(bot = ?me.username, id = me.id, "Bot token verified"),
            Err(e) => warn!(error = %e, "Could not verify bot token"),
        }
    }
    if relay.chat_id.is_none() {
        warn!("CHAT_ID not set; recent files are unavailable");
    }

    let platform: Arc<dyn MessagingPlatform> = Arc::new(client);
    let recent = Arc::new(RecencyCache::new());
    let state = AppState::new(
        Arc::clone(&platform),
        Arc::clone(&recent),
        file_refs,
        relay.clone(),
    );

    let listener_task = match (&relay.bot_token, &relay.chat_id) {
        (Some(_), Some(chat_id)) if settings.listen_updates => Some(
            UpdateListener::new(
                platform,
                recent,
                chat_id.clone(),
                Arc::clone(&state.listener_running),
            )
            .spawn(),
        ),
        _ => {
            info!("Update listener disabled");
            None
        }
    };

    let app = api::build_router(state);
    let addr = settings.listen_addr();
    let tcp = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(address = %addr, "tg-file-relay listening");

    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    if let Some(task) = listener_task {
        task.abort();
    }
    info!("Shutdown complete.");
    Ok(())
}

/// Upload one file to the configured chat and print the outcome
async fn send(settings: Settings, path: &Path, caption: Option<String>) -> Result<()> {
    let relay = settings.relay();
    let (Some(token), Some(chat_id)) = (relay.bot_token.clone(), relay.chat_id.clone()) else {
        return Err(anyhow!("BOT_TOKEN and CHAT_ID must be set to send a file"));
    };

    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let mime_type = mime_for_path(path).to_string();
    let kind = SendKind::for_mime(&mime_type);

    let client = BotClient::new(
        &settings.api_url,
        Some(token.clone()),
        Arc::new(FileRefCache::new()),
    )?;
    let upload = FileUpload {
        file_name: file_name.clone(),
        mime_type,
        data: Bytes::from(data),
    };
    let sent = client
        .send_file(&UploadTarget { token, chat_id }, upload, caption, kind)
        .await
        .map_err(|e| {
            error!(error = %e, "Upload failed");
            anyhow!(e)
        })?;

    println!("Sent {} as message {}", file_name, sent.message_id);
    if let (Some(meta), Some(base)) = (&sent.metadata, relay.base_url.as_deref()) {
        println!("{}", api::protocol::stream_url(base, meta));
    }
    Ok(())
}

/// Content type for common extensions, octet-stream otherwise
fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
