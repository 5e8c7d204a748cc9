// SPDX-License-Identifier: Apache-2.0

use crate::broker::{BrokerError, Delivery, MessageSource};
use crate::event::{parse_event, RequestEvent};
use sqc_core::{JobError, JobResult};
use sqc_model::{SqcResponse, ValidationResult};
use sqc_store::RequestGateway;
use sqc_validation::Validator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn};

/// When a delivery is acknowledged relative to its processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Acknowledge on receipt. A crash mid-job loses the request.
    BeforeProcessing,
    /// Acknowledge once the response is written. A crash mid-job redelivers it.
    AfterResponse,
}

impl AckMode {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "before" | "before_processing" => Ok(Self::BeforeProcessing),
            "after" | "after_response" => Ok(Self::AfterResponse),
            other => Err(format!("unknown ack mode {other:?}; use before or after")),
        }
    }
}

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Not a request creation event; nothing was written.
    Dropped,
    Responded {
        request_id: String,
        response: SqcResponse,
    },
}

/// Turns request notifications into result objects.
pub struct JobRunner {
    gateway: Arc<RequestGateway>,
    validator: Arc<Validator>,
    ack_mode: AckMode,
    work_dir: Option<PathBuf>,
}

impl JobRunner {
    pub fn new(
        gateway: Arc<RequestGateway>,
        validator: Arc<Validator>,
        ack_mode: AckMode,
        work_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            gateway,
            validator,
            ack_mode,
            work_dir,
        }
    }

    #[must_use]
    pub fn ack_mode(&self) -> AckMode {
        self.ack_mode
    }

    /// Processes `delivery` and acknowledges it according to the ack mode.
    /// Only broker failures are returned; job failures become responses.
    pub fn handle_delivery(
        &self,
        source: &mut dyn MessageSource,
        delivery: Delivery,
    ) -> Result<JobOutcome, BrokerError> {
        if self.ack_mode == AckMode::BeforeProcessing {
            source.ack(delivery.tag)?;
        }
        if delivery.redelivered {
            info!(tag = delivery.tag, "processing redelivered message");
        }
        let outcome = self.process(&delivery.body);
        if self.ack_mode == AckMode::AfterResponse {
            source.ack(delivery.tag)?;
        }
        Ok(outcome)
    }

    pub fn process(&self, body: &[u8]) -> JobOutcome {
        match parse_event(body) {
            Ok(RequestEvent::Created { request_id }) => {
                let response = self.run_request(&request_id);
                JobOutcome::Responded {
                    request_id,
                    response,
                }
            }
            Ok(RequestEvent::Ignored { event_name }) => {
                warn!(event = %event_name, "invalid event name, dropping message");
                JobOutcome::Dropped
            }
            Err(err) => {
                warn!(error = %err, "malformed notification, dropping message");
                JobOutcome::Dropped
            }
        }
    }

    /// Validates request `id`, then removes the request and stores the
    /// response. Both store writes are best effort.
    pub fn run_request(&self, id: &str) -> SqcResponse {
        let _span = info_span!("job", request = id).entered();
        let started = Instant::now();
        info!("got request");

        let response = match self.validate_request(id) {
            Ok(result) => {
                info!(
                    models = result.models.len(),
                    residue_analysis = result.status.residue_analysis,
                    clash_analysis = result.status.clash_analysis,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request validated"
                );
                SqcResponse::ok(result)
            }
            Err(err) => classify(&err),
        };

        self.gateway.delete_request(id);
        self.gateway.write_response(id, &response);
        response
    }

    fn validate_request(&self, id: &str) -> JobResult<ValidationResult> {
        let scratch = match &self.work_dir {
            Some(dir) => tempfile::Builder::new().prefix("sqc-job-").tempdir_in(dir),
            None => tempfile::Builder::new().prefix("sqc-job-").tempdir(),
        }
        .map_err(|e| JobError::internal(format!("create job directory: {e}")))?;

        let downloaded = self.gateway.download_request(id, scratch.path())?;
        info!(stage = "download", file_type = %downloaded.file_type, "request ready");
        self.validator.validate(&downloaded.path)
    }
}

fn classify(err: &JobError) -> SqcResponse {
    if err.is_internal() {
        error!(stage = "validate", code = err.code(), error = %err, "request failed");
    } else {
        warn!(stage = "validate", code = err.code(), error = %err, "request rejected");
    }
    SqcResponse::err(err.public_message())
}
