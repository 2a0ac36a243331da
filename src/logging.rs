use log::{info, warn, error, debug, trace};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LoggingConfig;
use crate::error::{ErrorSeverity, PipelineError};

/// Structured logging context for pipeline components
pub struct LogContext {
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, Value>,
}

impl LogContext {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_block_number(self, block_number: u64) -> Self {
        self.with_metadata("block_number", json!(block_number))
    }

    pub fn with_block_hash(self, block_hash: &str) -> Self {
        self.with_metadata("block_hash", json!(block_hash))
    }

    pub fn with_transaction_hash(self, tx_hash: &str) -> Self {
        self.with_metadata("transaction_hash", json!(tx_hash))
    }

    pub fn with_address(self, address: &str) -> Self {
        self.with_metadata("address", json!(address))
    }

    pub fn with_rule(self, rule: &str) -> Self {
        self.with_metadata("rule", json!(rule))
    }

    pub fn with_sink(self, sink: &str) -> Self {
        self.with_metadata("sink", json!(sink))
    }

    pub fn with_duration_ms(self, duration_ms: u64) -> Self {
        self.with_metadata("duration_ms", json!(duration_ms))
    }

    pub fn with_retry_count(self, retry_count: u32) -> Self {
        self.with_metadata("retry_count", json!(retry_count))
    }

    fn format_message(&self, level: &str, message: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut log_entry = json!({
            "timestamp": timestamp,
            "level": level,
            "component": self.component,
            "operation": self.operation,
            "message": message,
        });

        for (key, value) in &self.metadata {
            log_entry[key] = value.clone();
        }

        log_entry.to_string()
    }

    pub fn info(&self, message: &str) {
        info!("{}", self.format_message("INFO", message));
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", self.format_message("WARN", message));
    }

    pub fn error(&self, message: &str) {
        error!("{}", self.format_message("ERROR", message));
    }

    pub fn debug(&self, message: &str) {
        debug!("{}", self.format_message("DEBUG", message));
    }

    pub fn trace(&self, message: &str) {
        trace!("{}", self.format_message("TRACE", message));
    }
}

/// Times a single operation and logs the outcome
pub struct PerformanceMonitor {
    pub start_time: SystemTime,
    operation: String,
    metadata: HashMap<String, Value>,
}

impl PerformanceMonitor {
    pub fn new(operation: &str) -> Self {
        Self {
            start_time: SystemTime::now(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    fn elapsed_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or_default()
            .as_millis() as u64
    }

    pub fn finish(self) -> u64 {
        let duration = self.elapsed_ms();

        let mut context = LogContext::new("performance", &self.operation)
            .with_duration_ms(duration);

        for (key, value) in self.metadata {
            context = context.with_metadata(&key, value);
        }

        context.debug(&format!("Operation completed in {}ms", duration));
        duration
    }

    pub fn finish_with_result<T, E>(self, result: &Result<T, E>) -> u64
    where
        E: std::fmt::Display,
    {
        let duration = self.elapsed_ms();

        let mut context = LogContext::new("performance", &self.operation)
            .with_duration_ms(duration);

        for (key, value) in self.metadata {
            context = context.with_metadata(&key, value);
        }

        match result {
            Ok(_) => {
                context.debug(&format!("Operation completed successfully in {}ms", duration));
            }
            Err(e) => {
                context = context.with_metadata("error", json!(e.to_string()));
                context.warn(&format!("Operation failed after {}ms: {}", duration, e));
            }
        }

        duration
    }
}

/// Error logging utilities
pub struct ErrorLogger;

impl ErrorLogger {
    pub fn log_error(error: &PipelineError, context: Option<LogContext>) {
        let severity = error.severity();

        let mut log_context = context.unwrap_or_else(|| LogContext::new("error", "unknown"));
        log_context = log_context
            .with_metadata("error_type", json!(format!("{:?}", error)))
            .with_metadata("severity", json!(format!("{:?}", severity)))
            .with_metadata("recoverable", json!(error.is_recoverable()));

        if let Some(delay) = error.retry_delay() {
            log_context = log_context.with_metadata("retry_delay_seconds", json!(delay));
        }

        let message = format!("Error occurred: {}", error);

        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => log_context.error(&message),
            ErrorSeverity::Medium => log_context.warn(&message),
            ErrorSeverity::Low => log_context.info(&message),
        }
    }

    pub fn log_recovery_attempt(error: &dyn std::fmt::Display, attempt: u32, max_attempts: u32) {
        let context = LogContext::new("recovery", "retry_attempt")
            .with_retry_count(attempt)
            .with_metadata("max_attempts", json!(max_attempts));

        if attempt == max_attempts {
            context.error(&format!("Final retry attempt failed: {}", error));
        } else {
            context.warn(&format!("Retry attempt {} of {}: {}", attempt, max_attempts, error));
        }
    }

    pub fn log_recovery_success(operation: &str, attempts: u32, total_duration_ms: u64) {
        let context = LogContext::new("recovery", "success")
            .with_metadata("operation", json!(operation))
            .with_retry_count(attempts)
            .with_duration_ms(total_duration_ms);

        context.info(&format!("Operation recovered after {} attempts in {}ms", attempts, total_duration_ms));
    }
}

/// Pipeline metrics emitted as structured log lines
pub struct MetricsLogger;

impl MetricsLogger {
    pub fn log_block_scanned(block_number: u64, transaction_count: usize, matched_count: usize) {
        let context = LogContext::new("metrics", "block_scanned")
            .with_block_number(block_number)
            .with_metadata("transaction_count", json!(transaction_count))
            .with_metadata("matched_count", json!(matched_count));

        context.debug(&format!(
            "Block {} scanned: {} of {} transactions matched",
            block_number, matched_count, transaction_count
        ));
    }

    pub fn log_rule_fired(rule: &str, severity: &str, tx_hash: &str) {
        let context = LogContext::new("metrics", "rule_fired")
            .with_rule(rule)
            .with_transaction_hash(tx_hash)
            .with_metadata("severity", json!(severity));

        context.info(&format!("Rule '{}' fired for transaction {}", rule, tx_hash));
    }

    pub fn log_rule_suppressed(rule: &str, tx_hash: &str) {
        let context = LogContext::new("metrics", "rule_suppressed")
            .with_rule(rule)
            .with_transaction_hash(tx_hash);

        context.debug(&format!("Rule '{}' matched {} but is cooling down", rule, tx_hash));
    }

    pub fn log_delivery(sink: &str, duration_ms: u64, success: bool) {
        let context = LogContext::new("metrics", "delivery")
            .with_sink(sink)
            .with_duration_ms(duration_ms)
            .with_metadata("success", json!(success));

        if success {
            context.debug(&format!("Alert delivered via {} in {}ms", sink, duration_ms));
        } else {
            context.warn(&format!("Alert delivery via {} failed after {}ms", sink, duration_ms));
        }
    }

    pub fn log_rpc_call(method: &str, duration_ms: u64, success: bool) {
        let context = LogContext::new("metrics", "rpc_call")
            .with_metadata("method", json!(method))
            .with_duration_ms(duration_ms)
            .with_metadata("success", json!(success));

        if success {
            context.debug(&format!("RPC call {} completed in {}ms", method, duration_ms));
        } else {
            context.warn(&format!("RPC call {} failed after {}ms", method, duration_ms));
        }
    }
}

/// Initialize structured logging for the application.
///
/// `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let structured = config.format == "json";

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.level.as_str()))
        .format(move |buf, record| {
            use std::io::Write;

            if structured {
                if let Ok(json_value) = serde_json::from_str::<Value>(record.args().to_string().as_str()) {
                    return writeln!(buf, "{}", serde_json::to_string_pretty(&json_value)?);
                }
            }

            writeln!(
                buf,
                "{} [{}] {}: {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()?;

    info!("Logging initialized at level {} ({} format)", config.level, config.format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_context_creation() {
        let context = LogContext::new("watcher", "subscribe");
        assert_eq!(context.component, "watcher");
        assert_eq!(context.operation, "subscribe");
        assert!(context.metadata.is_empty());
    }

    #[test]
    fn test_log_context_with_metadata() {
        let context = LogContext::new("engine", "evaluate")
            .with_block_number(12345)
            .with_transaction_hash("0xabc123")
            .with_rule("big-tx")
            .with_sink("ops-webhook");

        assert_eq!(context.metadata.get("block_number"), Some(&json!(12345)));
        assert_eq!(context.metadata.get("transaction_hash"), Some(&json!("0xabc123")));
        assert_eq!(context.metadata.get("rule"), Some(&json!("big-tx")));
        assert_eq!(context.metadata.get("sink"), Some(&json!("ops-webhook")));
    }

    #[test]
    fn test_performance_monitor_with_result() {
        let monitor = PerformanceMonitor::new("test_operation")
            .with_metadata("method", json!("eth_blockNumber"));
        assert_eq!(monitor.metadata.get("method"), Some(&json!("eth_blockNumber")));

        let result: Result<(), String> = Err("boom".to_string());
        let duration = monitor.finish_with_result(&result);
        assert!(duration < 60_000);
    }

    #[test]
    fn test_error_logging() {
        let error = PipelineError::Config(crate::error::ConfigError::MissingEnvVar("RPC_URL".to_string()));
        let context = LogContext::new("test", "error_test");

        ErrorLogger::log_error(&error, Some(context));
        ErrorLogger::log_recovery_attempt(&error, 1, 3);
    }

    #[test]
    fn test_metrics_logging() {
        MetricsLogger::log_block_scanned(12345, 120, 2);
        MetricsLogger::log_rule_fired("big-tx", "high", "0xabc");
        MetricsLogger::log_rule_suppressed("big-tx", "0xdef");
        MetricsLogger::log_delivery("ops-webhook", 42, false);
        MetricsLogger::log_rpc_call("eth_getBlockByHash", 250, true);
    }

    #[test]
    fn test_log_context_format_message() {
        let context = LogContext::new("fanout", "send")
            .with_metadata("key", json!("value"));

        let message = context.format_message("INFO", "test message");

        let parsed: Value = serde_json::from_str(&message).expect("Should be valid JSON");
        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["component"], "fanout");
        assert_eq!(parsed["operation"], "send");
        assert_eq!(parsed["message"], "test message");
        assert_eq!(parsed["key"], "value");
    }
}
