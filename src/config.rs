//! Command line and environment configuration
//!
//! Every option can come from a flag or from the environment; a `.env` file
//! in the working directory is loaded before parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::telegram::client::DEFAULT_API_URL;
use crate::telegram::UploadTarget;

#[derive(Debug, Parser)]
#[command(name = "tg-file-relay")]
#[command(about = "Upload, list and stream files through a Telegram chat", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Upload one file to the configured chat and exit
    Send {
        /// File to upload
        path: PathBuf,
        /// Caption shown under the file
        #[arg(long)]
        caption: Option<String>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Bot token used for streaming, listening and default uploads
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true, global = true)]
    pub bot_token: Option<String>,

    /// Chat that receives uploads and is watched for new files
    #[arg(long, env = "CHAT_ID", global = true, allow_hyphen_values = true)]
    pub chat_id: Option<String>,

    /// Public URL of this server, used to build stream links
    #[arg(long = "base-url", env = "APP_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Bind address
    #[arg(long = "bind", env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind: String,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Bot API endpoint
    #[arg(long, env = "TELEGRAM_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Watch the chat for new files via long polling
    #[arg(long, env = "LISTEN_UPDATES", default_value_t = true, action = ArgAction::Set)]
    pub listen_updates: bool,
}

impl Settings {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn relay(&self) -> RelaySettings {
        RelaySettings::new(
            self.bot_token.clone(),
            self.chat_id.clone(),
            self.base_url.clone(),
        )
    }
}

/// The part of the configuration request handlers see
#[derive(Debug, Clone, Default)]
pub struct RelaySettings {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub base_url: Option<String>,
}

impl RelaySettings {
    /// Blank values count as unset
    pub fn new(
        bot_token: Option<String>,
        chat_id: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        Self {
            bot_token: non_blank(bot_token),
            chat_id: non_blank(chat_id),
            base_url: non_blank(base_url).map(|url| url.trim_end_matches('/').to_string()),
        }
    }

    /// Whether an upload went to the server's own chat with the server's own
    /// token, so its file id is readable by this server
    pub fn is_default_target(&self, target: &UploadTarget) -> bool {
        self.bot_token.as_deref() == Some(target.token.as_str())
            && self.chat_id.as_deref() == Some(target.chat_id.as_str())
    }
}

pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
