//! Outbound notification delivery.

pub mod telegram;

pub use telegram::TelegramNotifier;

use serde::Deserialize;
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("request failed")]
    Request(#[from] reqwest::Error),
    #[error("failed to read media {path}")]
    Media {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("API error {code}: {description}")]
    Api { code: i64, description: String },
}

/// Caption markup understood by the chat backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ParseMode {
    #[default]
    Markdown,
    MarkdownV2,
    #[serde(rename = "HTML")]
    Html,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMode::Markdown => "Markdown",
            ParseMode::MarkdownV2 => "MarkdownV2",
            ParseMode::Html => "HTML",
        }
    }
}

/// Sends a captioned media message to a chat.
pub trait Notifier: Send + Sync + 'static {
    fn send_media(
        &self,
        destination: &str,
        media: &str,
        caption: &str,
        parse_mode: ParseMode,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
