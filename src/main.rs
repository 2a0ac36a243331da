use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use tx_alert_monitor::blockchain::{ChainWatcher, PollingHeaderSource, RpcClient, WatcherConfig};
use tx_alert_monitor::config::AppConfig;
use tx_alert_monitor::logging::{init_logging, ErrorLogger, LogContext};
use tx_alert_monitor::notify::Fanout;
use tx_alert_monitor::pipeline::AlertPipeline;
use tx_alert_monitor::rules::RuleEngine;
use tx_alert_monitor::PipelineError;

#[derive(Parser)]
#[command(name = "tx-alert-monitor")]
#[command(about = "Watch addresses on chain and dispatch rule-based alerts")]
#[command(version)]
struct Args {
    /// Configuration file (overrides CONFIG_FILE)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print a sample configuration and exit
    #[arg(long)]
    print_sample_config: bool,

    /// Write a sample configuration to this path and exit
    #[arg(long, value_name = "PATH")]
    write_sample_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.print_sample_config {
        println!("{}", AppConfig::generate_sample_config()?);
        return Ok(());
    }

    if let Some(path) = &args.write_sample_config {
        AppConfig::sample().save_to_file(path)?;
        println!("Sample configuration written to {}", path.display());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => AppConfig::load_with_path(path),
        None => AppConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Invalid configuration: {}", error);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging)?;

    let rpc = Arc::new(RpcClient::new_with_config(
        config.rpc.endpoint.clone(),
        config.rpc.timeout_seconds,
        config.rpc.retry_config(),
    ));
    let source = Arc::new(PollingHeaderSource::new(rpc, config.watcher.polling_config()));
    let watcher = Arc::new(ChainWatcher::with_config(
        source,
        WatcherConfig { channel_capacity: config.watcher.channel_capacity },
    ));

    let fanout = Arc::new(Fanout::from_config(&config.notifications));
    let engine = match RuleEngine::with_rules(fanout.clone(), config.rules.clone()) {
        Ok(engine) => Arc::new(engine),
        Err(error) => {
            let error = PipelineError::from(error);
            ErrorLogger::log_error(&error, Some(LogContext::new("main", "load_rules")));
            return Err(error.into());
        }
    };

    LogContext::new("main", "startup")
        .with_metadata("rules", serde_json::json!(engine.rule_names()))
        .with_metadata("sinks", serde_json::json!(fanout.sink_names()))
        .info("Starting tx-alert-monitor");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                LogContext::new("main", "shutdown").info("Received shutdown signal");
                shutdown.cancel();
            }
            Err(err) => {
                LogContext::new("main", "shutdown")
                    .error(&format!("Unable to listen for shutdown signal: {}", err));
            }
        }
    });

    let pipeline = AlertPipeline::new(watcher, engine, config.watcher.restart_delay());
    if let Err(error) = pipeline.run(cancel, &config.watcher.addresses).await {
        ErrorLogger::log_error(&error, Some(LogContext::new("main", "run")));
        return Err(error.into());
    }

    Ok(())
}
