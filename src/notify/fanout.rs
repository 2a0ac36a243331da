use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

use crate::config::NotificationConfig;
use crate::error::{DeliveryError, SinkError, SinkFailure};
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::Alert;
use crate::notify::{LogSink, NotificationSink, Notifier, TelegramSink, WebhookSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    #[default]
    Sequential,
    Concurrent,
}

/// Delivers every alert to all registered sinks.
///
/// A failing sink never stops the others; failures come back as one
/// [`DeliveryError`] in registration order.
#[derive(Default)]
pub struct Fanout {
    sinks: Vec<Arc<dyn NotificationSink>>,
    mode: DispatchMode,
}

impl Fanout {
    pub fn new(mode: DispatchMode) -> Self {
        Self { sinks: Vec::new(), mode }
    }

    /// Build every sink described in `config`, in file order
    pub fn from_config(config: &NotificationConfig) -> Self {
        let mode = if config.concurrent {
            DispatchMode::Concurrent
        } else {
            DispatchMode::Sequential
        };
        let mut fanout = Self::new(mode);

        if config.log {
            fanout.register(Arc::new(LogSink::default()));
        }
        for webhook in &config.webhooks {
            fanout.register(Arc::new(WebhookSink::new(
                webhook.name.as_str(),
                webhook.url.as_str(),
                webhook.secret.clone(),
            )));
        }
        for telegram in &config.telegram {
            let sink = match &telegram.api_base {
                Some(api_base) => TelegramSink::with_api_base(
                    telegram.name.as_str(),
                    api_base.as_str(),
                    telegram.bot_token.as_str(),
                    telegram.chat_id.as_str(),
                ),
                None => TelegramSink::new(
                    telegram.name.as_str(),
                    telegram.bot_token.as_str(),
                    telegram.chat_id.as_str(),
                ),
            };
            fanout.register(Arc::new(sink));
        }

        fanout
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn register(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|sink| sink.name().to_string()).collect()
    }

    pub async fn send(&self, alert: &Alert) -> Result<(), DeliveryError> {
        let message = alert.render();

        let results = match self.mode {
            DispatchMode::Sequential => {
                let mut results = Vec::with_capacity(self.sinks.len());
                for sink in &self.sinks {
                    results.push(deliver(sink.as_ref(), &message).await);
                }
                results
            }
            DispatchMode::Concurrent => {
                join_all(self.sinks.iter().map(|sink| deliver(sink.as_ref(), &message))).await
            }
        };

        let failures: Vec<SinkFailure> = self
            .sinks
            .iter()
            .zip(results)
            .filter_map(|(sink, result)| {
                result.err().map(|error| SinkFailure {
                    sink: sink.name().to_string(),
                    message: error.to_string(),
                })
            })
            .collect();

        if failures.is_empty() {
            return Ok(());
        }

        let error = DeliveryError { failures };
        LogContext::new("fanout", "send")
            .with_metadata("alert", serde_json::json!(alert.title))
            .with_metadata("failed_sinks", serde_json::json!(error.failures.len()))
            .with_metadata("total_sinks", serde_json::json!(self.sinks.len()))
            .warn(&format!("Alert delivery partially failed: {}", error));

        Err(error)
    }
}

async fn deliver(sink: &dyn NotificationSink, message: &str) -> Result<(), SinkError> {
    let monitor = PerformanceMonitor::new("sink_send")
        .with_metadata("sink", serde_json::json!(sink.name()));
    let result = sink.send(message).await;
    let duration = monitor.finish_with_result(&result);
    MetricsLogger::log_delivery(sink.name(), duration, result.is_ok());
    result
}

#[async_trait]
impl Notifier for Fanout {
    async fn notify(&self, alert: &Alert) -> Result<(), DeliveryError> {
        self.send(alert).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSink {
        name: String,
        fail_with: Option<String>,
        calls: AtomicU32,
    }

    impl CountingSink {
        fn new(name: &str, fail_with: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail_with: fail_with.map(|s| s.to_string()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl NotificationSink for CountingSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, _message: &str) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(reason) => Err(SinkError::Rejected(reason.clone())),
                None => Ok(()),
            }
        }
    }

    fn alert() -> Alert {
        Alert::new("Rule 'big-tx' triggered", "15 moved", Severity::High)
    }

    #[test]
    fn test_from_config_registers_sinks_in_order() {
        let config = NotificationConfig {
            concurrent: true,
            log: true,
            webhooks: vec![crate::config::WebhookConfig {
                name: "ops-webhook".to_string(),
                url: "https://hooks.example.com/abc".to_string(),
                secret: None,
            }],
            telegram: vec![crate::config::TelegramConfig {
                name: "tg".to_string(),
                bot_token: "123:abc".to_string(),
                chat_id: "-100".to_string(),
                api_base: None,
            }],
        };

        let fanout = Fanout::from_config(&config);
        assert_eq!(fanout.mode(), DispatchMode::Concurrent);
        assert_eq!(fanout.sink_names(), vec!["log", "ops-webhook", "tg"]);
    }

    #[tokio::test]
    async fn test_no_sinks_is_success() {
        let fanout = Fanout::new(DispatchMode::Sequential);
        assert!(fanout.is_empty());
        assert!(fanout.send(&alert()).await.is_ok());
    }

    #[tokio::test]
    async fn test_all_sinks_succeed() {
        let a = CountingSink::new("a", None);
        let b = CountingSink::new("b", None);
        let fanout = Fanout::new(DispatchMode::Sequential)
            .with_sink(a.clone())
            .with_sink(b.clone());

        assert!(fanout.send(&alert()).await.is_ok());
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fanout.sink_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_mode_keeps_registration_order() {
        let sinks = vec![
            CountingSink::new("first", Some("one")),
            CountingSink::new("second", None),
            CountingSink::new("third", Some("three")),
        ];
        let mut fanout = Fanout::new(DispatchMode::Concurrent);
        for sink in &sinks {
            fanout.register(sink.clone());
        }

        let error = fanout.send(&alert()).await.unwrap_err();
        assert_eq!(
            error.to_string(),
            "first: Rejected by channel: one; third: Rejected by channel: three"
        );
        for sink in &sinks {
            assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        }
    }
}
