use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::blockchain::address::WatchSet;
use crate::blockchain::subscription::{HeaderSource, HeaderSubscription};
use crate::error::{RpcError, WatcherError};
use crate::logging::{LogContext, MetricsLogger};
use crate::models::{BlockHeader, Transaction};

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Capacity of the outbound transaction channel
    pub channel_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { channel_capacity: 256 }
    }
}

/// Running watch: the transaction stream and the task feeding it.
///
/// The stream closes when the task ends. The task returns `Ok(())` on
/// cancellation and `Err(WatcherError::Subscription)` when the header
/// feed fails.
pub struct WatchHandle {
    pub transactions: mpsc::Receiver<Transaction>,
    pub task: JoinHandle<Result<(), WatcherError>>,
}

/// Turns a header feed into a stream of transactions touching watched addresses
pub struct ChainWatcher {
    source: Arc<dyn HeaderSource>,
    config: WatcherConfig,
}

impl ChainWatcher {
    pub fn new(source: Arc<dyn HeaderSource>) -> Self {
        Self::with_config(source, WatcherConfig::default())
    }

    pub fn with_config(source: Arc<dyn HeaderSource>, config: WatcherConfig) -> Self {
        Self { source, config }
    }

    /// Watch a single address
    pub async fn subscribe(
        &self,
        cancel: CancellationToken,
        address: &str,
    ) -> Result<WatchHandle, WatcherError> {
        self.subscribe_many(cancel, &[address]).await
    }

    /// Watch several addresses over one header subscription.
    ///
    /// Every address is validated before anything is subscribed.
    pub async fn subscribe_many<S: AsRef<str>>(
        &self,
        cancel: CancellationToken,
        addresses: &[S],
    ) -> Result<WatchHandle, WatcherError> {
        let watch = WatchSet::parse(addresses)?;
        if watch.is_empty() {
            return Err(WatcherError::InvalidAddress("no addresses to watch".to_string()));
        }

        let subscription = self
            .source
            .subscribe(cancel.clone())
            .await
            .map_err(WatcherError::Subscription)?;

        let (sender, receiver) = mpsc::channel(self.config.channel_capacity.max(1));
        let task = tokio::spawn(watch_loop(
            self.source.clone(),
            subscription,
            watch,
            sender,
            cancel,
        ));

        Ok(WatchHandle { transactions: receiver, task })
    }
}

enum Step {
    Continue,
    Stop,
}

async fn watch_loop(
    source: Arc<dyn HeaderSource>,
    mut subscription: HeaderSubscription,
    watch: WatchSet,
    sender: mpsc::Sender<Transaction>,
    cancel: CancellationToken,
) -> Result<(), WatcherError> {
    let addresses = watch.addresses().join(",");
    let context = LogContext::new("watcher", "subscribe").with_address(&addresses);
    context.info("Watching for transactions");

    let outcome = loop {
        let header = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            Some(error) = subscription.errors.recv() => {
                break Err(WatcherError::Subscription(error));
            }
            header = subscription.headers.recv() => match header {
                Some(header) => header,
                None => break Err(WatcherError::Subscription(RpcError::Connection(
                    "header feed closed".to_string(),
                ))),
            },
        };

        match process_header(source.as_ref(), &header, &watch, &sender, &cancel).await {
            Step::Continue => {}
            Step::Stop => break Ok(()),
        }
    };

    subscription.unsubscribe();

    match &outcome {
        Ok(()) => context.info("Watcher stopped"),
        Err(error) => context.error(&format!("Watcher stopped on subscription failure: {}", error)),
    }

    outcome
}

/// Fetch one block and emit its relevant transactions in block order
async fn process_header(
    source: &dyn HeaderSource,
    header: &BlockHeader,
    watch: &WatchSet,
    sender: &mpsc::Sender<Transaction>,
    cancel: &CancellationToken,
) -> Step {
    let fetched = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Step::Stop,
        result = source.block_by_hash(&header.hash) => result,
    };

    let block = match fetched {
        Ok(block) => block,
        Err(fetch_error) => {
            let error = WatcherError::BlockFetch { hash: header.hash.clone(), source: fetch_error };
            LogContext::new("watcher", "fetch_block")
                .with_block_number(header.number)
                .with_block_hash(&header.hash)
                .warn(&format!("Skipping block: {}", error));
            return Step::Continue;
        }
    };

    let total = block.transactions.len();
    let mut matched = 0;

    for transaction in block.transactions.into_iter().filter(|tx| watch.is_relevant(tx)) {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Step::Stop,
            sent = sender.send(transaction) => {
                if sent.is_err() {
                    LogContext::new("watcher", "emit")
                        .with_block_number(block.number)
                        .debug("Transaction receiver dropped");
                    return Step::Stop;
                }
            }
        }
        matched += 1;
    }

    MetricsLogger::log_block_scanned(block.number, total, matched);
    Step::Continue
}
