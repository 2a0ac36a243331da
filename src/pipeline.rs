use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::blockchain::{ChainWatcher, WatchSet};
use crate::error::{PipelineError, WatcherError};
use crate::logging::{ErrorLogger, LogContext};
use crate::models::{Alert, Transaction};
use crate::rules::RuleEngine;

/// Watcher → rule engine → fan-out, one long-lived task per address
pub struct AlertPipeline {
    watcher: Arc<ChainWatcher>,
    engine: Arc<RuleEngine>,
    restart_delay: Duration,
}

impl AlertPipeline {
    pub fn new(watcher: Arc<ChainWatcher>, engine: Arc<RuleEngine>, restart_delay: Duration) -> Self {
        Self { watcher, engine, restart_delay }
    }

    pub fn engine(&self) -> &Arc<RuleEngine> {
        &self.engine
    }

    /// Run until `cancel` fires.
    ///
    /// Addresses are validated before any task starts. A stream that closes
    /// without cancellation is resubscribed after the restart delay.
    pub async fn run<S: AsRef<str>>(
        &self,
        cancel: CancellationToken,
        addresses: &[S],
    ) -> Result<(), PipelineError> {
        let watch = WatchSet::parse(addresses)?;
        if watch.is_empty() {
            return Err(WatcherError::InvalidAddress("no addresses to watch".to_string()).into());
        }

        let context = LogContext::new("pipeline", "run")
            .with_metadata("addresses", json!(watch.addresses()))
            .with_metadata("rules", json!(self.engine.rule_names()));
        context.info("Starting alert pipeline");

        let tasks = watch.addresses().into_iter().map(|address| {
            tokio::spawn(watch_address(
                self.watcher.clone(),
                self.engine.clone(),
                cancel.clone(),
                address,
                self.restart_delay,
            ))
        });

        for result in join_all(tasks).await {
            if let Err(join_error) = result {
                LogContext::new("pipeline", "run").error(&format!("Watch task aborted: {}", join_error));
            }
        }

        context.info("Alert pipeline stopped");
        Ok(())
    }

    /// Evaluate one transaction; failures are logged and swallowed
    pub async fn process_transaction(&self, transaction: &Transaction) -> Vec<Alert> {
        process_transaction(&self.engine, transaction).await
    }
}

async fn process_transaction(engine: &RuleEngine, transaction: &Transaction) -> Vec<Alert> {
    match engine.evaluate(transaction).await {
        Ok(alerts) => alerts,
        Err(error) => {
            let fired = error.fired.clone();
            let context = LogContext::new("pipeline", "evaluate")
                .with_transaction_hash(&transaction.hash)
                .with_block_number(transaction.block_number);
            ErrorLogger::log_error(&PipelineError::Evaluation(error), Some(context));
            fired
        }
    }
}

async fn watch_address(
    watcher: Arc<ChainWatcher>,
    engine: Arc<RuleEngine>,
    cancel: CancellationToken,
    address: String,
    restart_delay: Duration,
) {
    let mut restarts = 0u32;

    while !cancel.is_cancelled() {
        match watcher.subscribe(cancel.clone(), &address).await {
            Ok(mut handle) => {
                while let Some(transaction) = handle.transactions.recv().await {
                    process_transaction(&engine, &transaction).await;
                }

                match handle.task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => {
                        let context = LogContext::new("pipeline", "watch").with_address(&address);
                        ErrorLogger::log_error(&PipelineError::Watcher(error), Some(context));
                    }
                    Err(join_error) => {
                        LogContext::new("pipeline", "watch")
                            .with_address(&address)
                            .error(&format!("Watcher task aborted: {}", join_error));
                    }
                }
            }
            Err(error) => {
                let context = LogContext::new("pipeline", "subscribe").with_address(&address);
                ErrorLogger::log_error(&PipelineError::Watcher(error), Some(context));
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        restarts += 1;
        LogContext::new("pipeline", "watch")
            .with_address(&address)
            .with_retry_count(restarts)
            .with_metadata("restart_delay_ms", json!(restart_delay.as_millis() as u64))
            .warn("Transaction stream closed, resubscribing");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(restart_delay) => {}
        }
    }
}
