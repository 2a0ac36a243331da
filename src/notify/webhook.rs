use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;

use crate::error::SinkError;
use crate::notify::NotificationSink;

type HmacSha256 = Hmac<Sha256>;

/// Reply body of chat-bot style webhooks; a non-zero `code` is a rejection
#[derive(Debug, Deserialize)]
struct WebhookReply {
    #[serde(default, alias = "StatusCode")]
    code: i64,
    #[serde(default, alias = "StatusMessage")]
    msg: String,
}

/// Signature for a signed bot webhook.
///
/// The key is `"{timestamp}\n{secret}"` and the message is empty; the
/// MAC is base64-encoded.
pub fn sign_webhook(timestamp: i64, secret: &str) -> Result<String, SinkError> {
    let key = format!("{}\n{}", timestamp, secret);
    let mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| SinkError::Signing(e.to_string()))?;
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Posts alerts as text messages to an HTTP webhook
pub struct WebhookSink {
    name: String,
    url: String,
    secret: Option<String>,
    client: Client,
}

impl WebhookSink {
    pub fn new(name: impl Into<String>, url: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            secret: secret.filter(|s| !s.is_empty()),
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    fn payload(&self, message: &str, timestamp: i64) -> Result<Value, SinkError> {
        let mut body = json!({
            "msg_type": "text",
            "content": { "text": message },
        });

        if let Some(secret) = &self.secret {
            body["timestamp"] = json!(timestamp.to_string());
            body["sign"] = json!(sign_webhook(timestamp, secret)?);
        }

        Ok(body)
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &str) -> Result<(), SinkError> {
        let body = self.payload(message, chrono::Utc::now().timestamp())?;

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(SinkError::Status { status: status.as_u16(), body: text });
        }

        // Plain endpoints may answer with an empty or non-JSON body
        if let Ok(reply) = serde_json::from_str::<WebhookReply>(&text) {
            if reply.code != 0 {
                return Err(SinkError::Rejected(format!("code {}: {}", reply.code, reply.msg)));
            }
        }

        Ok(())
    }
}
