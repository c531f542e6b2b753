//! Circuit breaker demo.
//!
//! Drives a simulated flaky inventory backend through the breaker engine
//! while the state observer reports open circuits.
//!
//! ```text
//!   callers ──▶ Protected<FlakyInventory> ──▶ CommandExecutor ──▶ FlakyInventory
//!                                               │
//!                                               ▼
//!                                        BreakerRegistry ◀── StateObserver ──▶ log / notifier
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures_util::stream::{self, StreamExt};
use thiserror::Error;

use command_breaker::config::loader::load_config;
use command_breaker::health::{LogNotifier, StateObserver};
use command_breaker::lifecycle::{signals, Shutdown};
use command_breaker::observability::{logging, metrics};
use command_breaker::resilience::registry;
use command_breaker::{CommandError, EngineConfig, Protected};

#[derive(Parser)]
#[command(name = "breaker-demo")]
#[command(about = "Drive a flaky dependency through circuit breakers", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of calls to make
    #[arg(long, default_value_t = 200)]
    calls: usize,

    /// Probability (0.0-1.0) that the backend fails a call
    #[arg(long, default_value_t = 0.6)]
    failure_rate: f64,

    /// Calls in flight at once
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Pause before each call, in milliseconds
    #[arg(long, default_value_t = 25)]
    pause_ms: u64,
}

#[derive(Debug, Error)]
enum InventoryError {
    #[error("inventory backend unavailable")]
    Unavailable,
}

struct FlakyInventory {
    failure_rate: f64,
}

impl FlakyInventory {
    async fn lookup(&self, sku: u32) -> Result<u32, InventoryError> {
        tokio::time::sleep(Duration::from_millis(fastrand::u64(5..50))).await;
        if fastrand::f64() < self.failure_rate {
            Err(InventoryError::Unavailable)
        } else {
            Ok(sku % 17)
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    ok: usize,
    failed: usize,
    open_circuit: usize,
    rejected: usize,
    timed_out: usize,
}

impl Tally {
    fn add(&mut self, result: &Result<u32, CommandError<InventoryError>>) {
        match result {
            Ok(_) => self.ok += 1,
            Err(CommandError::OpenCircuit) => self.open_circuit += 1,
            Err(CommandError::Rejected) => self.rejected += 1,
            Err(CommandError::TimedOut) => self.timed_out += 1,
            Err(CommandError::Operation(_)) => self.failed += 1,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("breaker-demo v0.1.0 starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    let observer = StateObserver::new(registry::global(), &config.observer).with_notifier(Arc::new(LogNotifier));
    let observer_task = observer.spawn(shutdown.subscribe());
    tokio::spawn(signals::shutdown_on_ctrl_c(shutdown.clone()));

    let inventory = Protected::builder(
        FlakyInventory {
            failure_rate: cli.failure_rate.clamp(0.0, 1.0),
        },
        "Inventory",
    )
    .protect_from_config(&config, &["lookup"])
    .build()?;

    tracing::info!(
        calls = cli.calls,
        concurrency = cli.concurrency,
        failure_rate = cli.failure_rate,
        "Driving calls"
    );

    let pause = Duration::from_millis(cli.pause_ms);
    let mut results = stream::iter(0..cli.calls)
        .map(|i| {
            let inventory = inventory.clone();
            async move {
                tokio::time::sleep(pause).await;
                inventory
                    .call("lookup", i as u32, |svc, sku| async move { svc.lookup(sku).await })
                    .await
            }
        })
        .buffer_unordered(cli.concurrency.max(1));

    let mut stop = shutdown.subscribe();
    let mut tally = Tally::default();
    loop {
        tokio::select! {
            next = results.next() => match next {
                Some(result) => tally.add(&result),
                None => break,
            },
            _ = stop.recv() => break,
        }
    }

    if let Some(key) = inventory.key_for("lookup") {
        if let Some(entry) = registry::global().get(key) {
            let counts = entry.window().counts();
            let latency = entry.latency().percentiles();
            tracing::info!(
                operation = %key,
                status = %entry.circuit().status(),
                success = counts.success,
                failure = counts.failure,
                short_circuit = counts.short_circuit,
                cancelled = counts.cancelled,
                mean_latency_ms = counts.mean_latency_ms(),
                p50_ms = latency.p50,
                p99_ms = latency.p99,
                "Final breaker state"
            );
        }
    }

    tracing::info!(
        ok = tally.ok,
        failed = tally.failed,
        open_circuit = tally.open_circuit,
        rejected = tally.rejected,
        timed_out = tally.timed_out,
        "Run complete"
    );

    shutdown.trigger();
    observer_task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
