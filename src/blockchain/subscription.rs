use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::blockchain::rpc_client::RpcClient;
use crate::error::RpcError;
use crate::logging::LogContext;
use crate::models::{Block, BlockHeader};

/// Source of new block headers plus full-block lookup by hash.
///
/// Implementations own the transport; the watcher only sees headers,
/// a terminal error channel and `block_by_hash`.
#[async_trait]
pub trait HeaderSource: Send + Sync {
    /// Open a header feed. The feed stops when `cancel` fires or the
    /// returned subscription is unsubscribed or dropped.
    async fn subscribe(&self, cancel: CancellationToken) -> Result<HeaderSubscription, RpcError>;

    async fn block_by_hash(&self, hash: &str) -> Result<Block, RpcError>;
}

/// Live header feed.
///
/// `errors` yields at most one terminal error, after which `headers` closes.
pub struct HeaderSubscription {
    pub headers: mpsc::Receiver<BlockHeader>,
    pub errors: mpsc::Receiver<RpcError>,
    stop: CancellationToken,
}

impl HeaderSubscription {
    pub fn new(
        headers: mpsc::Receiver<BlockHeader>,
        errors: mpsc::Receiver<RpcError>,
        stop: CancellationToken,
    ) -> Self {
        Self { headers, errors, stop }
    }

    /// Tell the producer to stop; pending headers can still be drained
    pub fn unsubscribe(&self) {
        self.stop.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.stop.is_cancelled()
    }
}

impl Drop for HeaderSubscription {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Tuning for [`PollingHeaderSource`]
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub poll_interval: Duration,
    /// Headers are emitted only once they are this many blocks below the head
    pub confirmations: u64,
    /// Consecutive failed polls before the feed reports a terminal error
    pub max_consecutive_failures: u32,
    pub channel_capacity: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            confirmations: 0,
            max_consecutive_failures: 5,
            channel_capacity: 64,
        }
    }
}

/// Header feed built on JSON-RPC polling of the chain head
pub struct PollingHeaderSource {
    rpc: Arc<RpcClient>,
    config: PollingConfig,
}

enum PollError {
    Rpc(RpcError),
    Closed,
}

impl PollingHeaderSource {
    pub fn new(rpc: Arc<RpcClient>, config: PollingConfig) -> Self {
        Self { rpc, config }
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    async fn confirmed_head(rpc: &RpcClient, confirmations: u64) -> Result<u64, RpcError> {
        let latest = rpc.get_latest_block_number().await?;
        Ok(latest.saturating_sub(confirmations))
    }

    async fn poll_once(
        rpc: &RpcClient,
        config: &PollingConfig,
        next: &mut u64,
        headers: &mpsc::Sender<BlockHeader>,
        stop: &CancellationToken,
    ) -> Result<(), PollError> {
        let head = Self::confirmed_head(rpc, config.confirmations)
            .await
            .map_err(PollError::Rpc)?;

        while *next <= head {
            let header = tokio::select! {
                biased;
                _ = stop.cancelled() => return Err(PollError::Closed),
                result = rpc.get_block_header(*next) => result.map_err(PollError::Rpc)?,
            };

            tokio::select! {
                biased;
                _ = stop.cancelled() => return Err(PollError::Closed),
                sent = headers.send(header) => {
                    if sent.is_err() {
                        return Err(PollError::Closed);
                    }
                }
            }

            *next += 1;
        }

        Ok(())
    }

    async fn run(
        rpc: Arc<RpcClient>,
        config: PollingConfig,
        mut next: u64,
        headers: mpsc::Sender<BlockHeader>,
        errors: mpsc::Sender<RpcError>,
        stop: CancellationToken,
    ) {
        let context = LogContext::new("header_source", "poll")
            .with_metadata("endpoint", serde_json::json!(rpc.endpoint()))
            .with_metadata("start_block", serde_json::json!(next));
        context.info("Header polling started");

        let mut ticker = interval(config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match Self::poll_once(&rpc, &config, &mut next, &headers, &stop).await {
                Ok(()) => consecutive_failures = 0,
                Err(PollError::Closed) => break,
                Err(PollError::Rpc(error)) => {
                    consecutive_failures += 1;
                    let context = LogContext::new("header_source", "poll")
                        .with_block_number(next)
                        .with_retry_count(consecutive_failures)
                        .with_metadata("max_consecutive_failures", serde_json::json!(config.max_consecutive_failures));

                    if consecutive_failures >= config.max_consecutive_failures {
                        context.error(&format!("Header polling giving up: {}", error));
                        let _ = errors.send(error).await;
                        break;
                    }
                    context.warn(&format!("Header poll failed, retrying next tick: {}", error));
                }
            }
        }

        LogContext::new("header_source", "poll")
            .with_block_number(next)
            .info("Header polling stopped");
    }
}

#[async_trait]
impl HeaderSource for PollingHeaderSource {
    async fn subscribe(&self, cancel: CancellationToken) -> Result<HeaderSubscription, RpcError> {
        // Start at the current confirmed head; nothing older is replayed
        let start = Self::confirmed_head(&self.rpc, self.config.confirmations).await?;

        let capacity = self.config.channel_capacity.max(1);
        let (header_tx, header_rx) = mpsc::channel(capacity);
        let (error_tx, error_rx) = mpsc::channel(1);
        let stop = cancel.child_token();

        tokio::spawn(Self::run(
            self.rpc.clone(),
            self.config.clone(),
            start,
            header_tx,
            error_tx,
            stop.clone(),
        ));

        Ok(HeaderSubscription::new(header_rx, error_rx, stop))
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Block, RpcError> {
        self.rpc.get_block_by_hash(hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polling_config_defaults() {
        let config = PollingConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.confirmations, 0);
        assert_eq!(config.max_consecutive_failures, 5);
        assert_eq!(config.channel_capacity, 64);
    }

    #[tokio::test]
    async fn test_dropping_subscription_cancels_producer() {
        let parent = CancellationToken::new();
        let stop = parent.child_token();
        let (_header_tx, header_rx) = mpsc::channel::<BlockHeader>(1);
        let (_error_tx, error_rx) = mpsc::channel::<RpcError>(1);

        let subscription = HeaderSubscription::new(header_rx, error_rx, stop.clone());
        assert!(subscription.is_active());

        drop(subscription);
        assert!(stop.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_subscription() {
        let parent = CancellationToken::new();
        let (_header_tx, header_rx) = mpsc::channel::<BlockHeader>(1);
        let (_error_tx, error_rx) = mpsc::channel::<RpcError>(1);

        let subscription = HeaderSubscription::new(header_rx, error_rx, parent.child_token());
        parent.cancel();
        assert!(!subscription.is_active());
    }
}
