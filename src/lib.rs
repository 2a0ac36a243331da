pub mod blockchain;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod retry;
pub mod rules;

pub use blockchain::{ChainWatcher, HeaderSource, PollingHeaderSource, RpcClient};
pub use config::{AppConfig, LoggingConfig, NotificationConfig, RpcConfig, WatcherSettings};
pub use error::{PipelineError, Result};
pub use logging::{init_logging, ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
pub use models::{Alert, Severity, Transaction};
pub use notify::{Fanout, NotificationSink, Notifier};
pub use pipeline::AlertPipeline;
pub use retry::{RetryConfig, RetryManager, RetryUtils};
pub use rules::{AlertRule, RuleCondition, RuleEngine};
