// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Queue-driven worker pool for structure quality control.
//!
//! Each worker holds its own broker connection and handles one request
//! notification at a time: download the structure, normalize it to PDB,
//! validate every model, then replace the request object with a result
//! object.

pub mod broker;
pub mod config;
pub mod event;
pub mod job;
pub mod supervisor;
pub mod worker;

use sqc_store::{GatewayConfig, RequestGateway, StoreInstrumentation};
use sqc_validation::{GitProvenance, ProvenanceSource, Validator};
use std::sync::Arc;

pub const CRATE_NAME: &str = "sqc-worker";

pub use broker::{
    AmqpConnector, BrokerConnector, BrokerError, Delivery, InMemoryBroker, MessageSource,
};
pub use config::{StoreBackendConfig, WorkerConfig};
pub use event::{creation_event, parse_event, EventError, RequestEvent};
pub use job::{AckMode, JobOutcome, JobRunner};
pub use supervisor::{ShutdownCause, ShutdownToken, ShutdownTrigger, WorkerPool};
pub use worker::{Worker, WorkerReport, WorkerState, WorkerTimings};

/// Builds the shared job pipeline: sets up the buckets and their
/// notification, then wires the validator with the given provenance.
/// Object store traffic is reported to `store_metrics`.
pub fn build_job_runner(
    config: &WorkerConfig,
    provenance: Arc<dyn ProvenanceSource>,
    store_metrics: Arc<dyn StoreInstrumentation>,
) -> Result<Arc<JobRunner>, String> {
    let gateway = RequestGateway::new(
        config.store.build(store_metrics),
        GatewayConfig {
            retry: config.retry.clone(),
            notification_queue_arn: config.notification_queue_arn.clone(),
            converter: config.converter.clone(),
        },
    )
    .map_err(|e| format!("object store setup failed: {e}"))?;
    let validator = Validator::new(config.molprobity.clone(), provenance);
    Ok(Arc::new(JobRunner::new(
        Arc::new(gateway),
        Arc::new(validator),
        config.ack_mode,
        config.work_dir.clone(),
    )))
}

/// Provenance read from the reference dataset checkouts.
#[must_use]
pub fn git_provenance(config: &WorkerConfig) -> Arc<dyn ProvenanceSource> {
    Arc::new(GitProvenance::new(config.reference_data_root.clone()))
}

/// Starts `config.workers` workers against `connector`.
pub fn spawn_pool(
    config: &WorkerConfig,
    connector: Arc<dyn BrokerConnector>,
    jobs: Arc<JobRunner>,
) -> std::io::Result<WorkerPool> {
    let timings = WorkerTimings {
        consume_wait: config.consume_wait,
        reconnect_delay: config.reconnect_delay,
    };
    WorkerPool::spawn(config.workers, |index, token| {
        let worker = Worker::new(
            format!("sqc-worker-{index}"),
            Arc::clone(&connector),
            Arc::clone(&jobs),
            token,
            timings,
        );
        move || {
            worker.run();
        }
    })
}
