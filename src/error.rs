use thiserror::Error;

use crate::models::Alert;

/// Main error type for the transaction alert pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Watcher error: {0}")]
    Watcher(#[from] WatcherError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// JSON-RPC transport errors
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC method error: code={code}, message={message}")]
    Method { code: i32, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Rate limit exceeded, retry after {seconds} seconds")]
    RateLimit { seconds: u64 },

    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Chain watcher errors
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Terminal failure of the header feed; ends the transaction stream.
    #[error("Header subscription failed: {0}")]
    Subscription(RpcError),

    /// Per-block failure; the block is skipped.
    #[error("Failed to fetch block {hash}: {source}")]
    BlockFetch {
        hash: String,
        #[source]
        source: RpcError,
    },
}

/// Rule registration and condition errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("Rule '{0}' already exists")]
    DuplicateRule(String),

    #[error("Condition on '{field}' expects a {expected} value, got {found}")]
    ConditionTypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Unknown condition field: {0}")]
    UnknownField(String),

    #[error("Unsupported operator '{operator}' for field '{field}'")]
    UnsupportedOperator { field: String, operator: String },
}

/// Failure reported by a single notification sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rejected by channel: {0}")]
    Rejected(String),

    #[error("Message signing failed: {0}")]
    Signing(String),
}

/// One failed sink inside an aggregate delivery error
#[derive(Debug, Clone, PartialEq)]
pub struct SinkFailure {
    pub sink: String,
    pub message: String,
}

/// Aggregate of every sink that failed while delivering one alert.
///
/// Failures keep sink registration order; the message joins them with `; `.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", join_sink_failures(.failures))]
pub struct DeliveryError {
    pub failures: Vec<SinkFailure>,
}

fn join_sink_failures(failures: &[SinkFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{}: {}", failure.sink, failure.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A fired rule whose alert could not be delivered everywhere
#[derive(Debug, Clone)]
pub struct RuleDeliveryFailure {
    pub rule: String,
    pub error: DeliveryError,
}

/// Delivery failures collected during one evaluation pass.
///
/// `fired` holds every alert produced in the pass, delivered or not.
#[derive(Error, Debug)]
#[error("delivery failed for {} of {} fired rule(s): {}", .failures.len(), .fired.len(), summarize_failures(.failures))]
pub struct EvaluationError {
    pub fired: Vec<Alert>,
    pub failures: Vec<RuleDeliveryFailure>,
}

fn summarize_failures(failures: &[RuleDeliveryFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("rule '{}': {}", failure.rule, failure.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// High priority errors that affect functionality
    High,
    /// Medium priority errors that may affect performance
    Medium,
    /// Low priority errors that are mostly informational
    Low,
}

impl RpcError {
    /// Check if the request may succeed when retried
    pub fn is_recoverable(&self) -> bool {
        match self {
            RpcError::Timeout { .. } => true,
            RpcError::RateLimit { .. } => true,
            RpcError::Connection(_) => true,
            // Freshly announced blocks can lag behind on load-balanced nodes
            RpcError::BlockNotFound(_) => true,
            RpcError::Http(e) => e.is_timeout() || e.is_connect(),
            RpcError::Json(_) => false,
            RpcError::Method { .. } => false,
            RpcError::InvalidResponse(_) => false,
        }
    }
}

impl PipelineError {
    /// Get the severity level of an error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PipelineError::Config(_) => ErrorSeverity::Critical,
            PipelineError::Watcher(WatcherError::InvalidAddress(_)) => ErrorSeverity::Critical,

            PipelineError::Watcher(WatcherError::Subscription(_)) => ErrorSeverity::High,
            PipelineError::Delivery(_) => ErrorSeverity::High,
            PipelineError::Evaluation(_) => ErrorSeverity::High,

            PipelineError::Rpc(RpcError::Timeout { .. }) => ErrorSeverity::Medium,
            PipelineError::Rpc(RpcError::RateLimit { .. }) => ErrorSeverity::Medium,
            PipelineError::Watcher(WatcherError::BlockFetch { .. }) => ErrorSeverity::Medium,

            PipelineError::Rule(_) => ErrorSeverity::Low,
            PipelineError::Rpc(RpcError::BlockNotFound(_)) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            PipelineError::Rpc(e) => e.is_recoverable(),
            PipelineError::Watcher(WatcherError::BlockFetch { source, .. }) => source.is_recoverable(),
            // A closed stream is recovered by resubscribing
            PipelineError::Watcher(WatcherError::Subscription(_)) => true,

            PipelineError::Watcher(WatcherError::InvalidAddress(_)) => false,
            PipelineError::Config(_) => false,
            PipelineError::Rule(_) => false,
            PipelineError::Delivery(_) => false,
            PipelineError::Evaluation(_) => false,
        }
    }

    /// Get suggested retry delay in seconds for recoverable errors
    pub fn retry_delay(&self) -> Option<u64> {
        if !self.is_recoverable() {
            return None;
        }

        match self {
            PipelineError::Rpc(RpcError::RateLimit { seconds }) => Some(*seconds),
            PipelineError::Rpc(RpcError::Timeout { .. }) => Some(5),
            PipelineError::Rpc(RpcError::Connection(_)) => Some(10),
            PipelineError::Watcher(WatcherError::Subscription(_)) => Some(15),
            _ => Some(5),
        }
    }
}
