//! Telegram Bot API delivery (`sendVideo`).
//!
//! Local media paths are uploaded as multipart file parts on every send;
//! `http(s)://` URLs are passed through for Telegram to fetch itself.

use crate::notify::{DeliveryError, Notifier, ParseMode};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

const DEFAULT_FILE_NAME: &str = "video.mp4";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

/// Bot API client bound to one bot token.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl TelegramNotifier {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            token: token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_url.trim_end_matches('/'),
            self.token,
            method
        )
    }
}

fn is_remote(media: &str) -> bool {
    media.starts_with("http://") || media.starts_with("https://")
}

async fn media_part(media: &str) -> Result<Part, DeliveryError> {
    let bytes = tokio::fs::read(media)
        .await
        .map_err(|source| DeliveryError::Media {
            path: media.to_string(),
            source,
        })?;
    let file_name = Path::new(media)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_FILE_NAME)
        .to_string();
    Ok(Part::bytes(bytes).file_name(file_name))
}

impl Notifier for TelegramNotifier {
    async fn send_media(
        &self,
        destination: &str,
        media: &str,
        caption: &str,
        parse_mode: ParseMode,
    ) -> Result<(), DeliveryError> {
        let form = Form::new()
            .text("chat_id", destination.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", parse_mode.as_str());

        let form = if is_remote(media) {
            form.text("video", media.to_string())
        } else {
            form.part("video", media_part(media).await?)
        };

        let response = self
            .client
            .post(self.method_url("sendVideo"))
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body: ApiResponse = response.json().await?;

        if body.ok {
            debug!(chat = %destination, "sendVideo accepted");
            return Ok(());
        }

        Err(DeliveryError::Api {
            code: body.error_code.unwrap_or(i64::from(status.as_u16())),
            description: body
                .description
                .unwrap_or_else(|| status.to_string()),
        })
    }
}
