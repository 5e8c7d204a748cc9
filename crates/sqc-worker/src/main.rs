// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use signal_hook::consts::{SIGINT, SIGTERM};
use sqc_store::StoreMetricsCollector;
use sqc_worker::{
    build_job_runner, git_provenance, spawn_pool, AmqpConnector, BrokerConnector, ShutdownCause,
    WorkerConfig,
};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn run(config: &WorkerConfig) -> Result<ShutdownCause, String> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGTERM, SIGINT] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .map_err(|e| format!("register signal {signal}: {e}"))?;
    }

    let store_metrics = Arc::new(StoreMetricsCollector::default());
    let jobs = build_job_runner(config, git_provenance(config), store_metrics.clone())?;
    let connector: Arc<dyn BrokerConnector> = Arc::new(AmqpConnector::new(config.amqp_url.clone()));
    let pool = spawn_pool(config, connector, jobs).map_err(|e| format!("spawn workers: {e}"))?;
    info!(
        workers = pool.len(),
        ack_mode = ?config.ack_mode,
        "sqc worker pool started"
    );
    let cause = pool.supervise(&stop, config.supervisor_poll);

    let totals = store_metrics.snapshot();
    info!(
        requests = totals.request_count,
        bytes_downloaded = totals.bytes_downloaded,
        bytes_uploaded = totals.bytes_uploaded,
        latency_ms_total = %totals.latency_ms_total,
        failures = ?totals.failures_by_class,
        "object store totals"
    );
    Ok(cause)
}

fn main() -> ExitCode {
    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(true);
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_json);

    match run(&config) {
        Ok(cause) => {
            info!(cause = ?cause, "sqc worker exiting");
            ExitCode::from(cause.exit_code())
        }
        Err(e) => {
            error!(error = %e, "startup failed");
            ExitCode::FAILURE
        }
    }
}
