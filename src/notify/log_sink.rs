use async_trait::async_trait;

use crate::error::SinkError;
use crate::logging::LogContext;
use crate::notify::NotificationSink;

/// Writes alerts to the application log; never fails
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new("log")
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &str) -> Result<(), SinkError> {
        LogContext::new("alert", "deliver")
            .with_sink(&self.name)
            .warn(message);
        Ok(())
    }
}
