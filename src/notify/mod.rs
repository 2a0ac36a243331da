pub mod fanout;
pub mod log_sink;
pub mod telegram;
pub mod webhook;

use async_trait::async_trait;

use crate::error::{DeliveryError, SinkError};
use crate::models::Alert;

pub use fanout::{DispatchMode, Fanout};
pub use log_sink::LogSink;
pub use telegram::TelegramSink;
pub use webhook::{sign_webhook, WebhookSink};

/// Anything that can take a fired alert off the engine's hands
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<(), DeliveryError>;
}

/// One delivery channel. Wire format and signing stay inside the sink.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &str) -> Result<(), SinkError>;
}
