use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::error::SinkError;
use crate::notify::NotificationSink;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends alerts through a Telegram bot's `sendMessage`
pub struct TelegramSink {
    name: String,
    api_base: String,
    bot_token: String,
    chat_id: String,
    client: Client,
}

impl TelegramSink {
    pub fn new(name: impl Into<String>, bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self::with_api_base(name, DEFAULT_API_BASE, bot_token, chat_id)
    }

    pub fn with_api_base(
        name: impl Into<String>,
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &str) -> Result<(), SinkError> {
        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
            "disable_web_page_preview": true,
        });

        let response = self.client.post(self.endpoint()).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        let reply = serde_json::from_str::<TelegramReply>(&text).ok();
        match reply {
            Some(reply) if reply.ok && status.is_success() => Ok(()),
            Some(reply) => Err(SinkError::Rejected(
                reply.description.unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            )),
            _ => Err(SinkError::Status { status: status.as_u16(), body: text }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_includes_token() {
        let sink = TelegramSink::with_api_base("tg", "http://localhost:9000/", "123:abc", "-100");
        assert_eq!(sink.endpoint(), "http://localhost:9000/bot123:abc/sendMessage");
        assert_eq!(sink.name(), "tg");
    }

    #[test]
    fn test_default_api_base() {
        let sink = TelegramSink::new("tg", "token", "chat");
        assert!(sink.endpoint().starts_with("https://api.telegram.org/bottoken"));
    }
}
