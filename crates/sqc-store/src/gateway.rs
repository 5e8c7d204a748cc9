// SPDX-License-Identifier: Apache-2.0

use crate::backend::{NotificationRule, ObjectMetadata, ObjectStore, StoreError};
use crate::convert::FormatConverter;
use crate::paths::{
    local_file_stem, result_key, DEFAULT_NOTIFICATION_ARN, ERROR_METADATA_KEY,
    ERROR_METADATA_MAX_BYTES, FILE_TYPE_METADATA_KEY, NOTIFICATION_RULE_ID,
    OBJECT_CREATED_EVENTS, REQUEST_BUCKET, RESULT_BUCKET,
};
use crate::retry::{retry, RetryPolicy};
use sqc_core::{JobError, JobResult};
use sqc_model::{FileType, SqcResponse, ValidationResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub retry: RetryPolicy,
    pub notification_queue_arn: String,
    pub converter: FormatConverter,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            notification_queue_arn: DEFAULT_NOTIFICATION_ARN.to_string(),
            converter: FormatConverter::default(),
        }
    }
}

/// A request body on local disk, already in PDB format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedRequest {
    pub path: PathBuf,
    /// Type declared by the submitter, before any conversion.
    pub file_type: FileType,
}

/// A result object read back from the results bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub body: Vec<u8>,
    pub error: Option<String>,
}

impl StoredResponse {
    pub fn into_response(self) -> Result<SqcResponse, serde_json::Error> {
        match self.error {
            Some(message) => Ok(SqcResponse::Err(message)),
            None => ValidationResult::from_json_slice(&self.body).map(SqcResponse::Ok),
        }
    }
}

/// Request and result buckets as seen by the job pipeline.
pub struct RequestGateway {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    converter: FormatConverter,
}

impl RequestGateway {
    /// Ensures both buckets exist and that new requests are announced on
    /// the broker. Safe to run from every worker on every start.
    pub fn new(store: Arc<dyn ObjectStore>, config: GatewayConfig) -> Result<Self, StoreError> {
        for bucket in [REQUEST_BUCKET, RESULT_BUCKET] {
            retry(&config.retry, "ensure_bucket", StoreError::is_transient, || {
                store.ensure_bucket(bucket)
            })?;
        }
        let rule = NotificationRule {
            id: NOTIFICATION_RULE_ID.to_string(),
            queue_arn: config.notification_queue_arn.clone(),
            events: OBJECT_CREATED_EVENTS.iter().map(|e| (*e).to_string()).collect(),
        };
        retry(
            &config.retry,
            "set_bucket_notification",
            StoreError::is_transient,
            || store.set_bucket_notification(REQUEST_BUCKET, &rule),
        )?;
        info!(
            queue_arn = %config.notification_queue_arn,
            "request notifications registered"
        );
        Ok(Self {
            store,
            retry: config.retry,
            converter: config.converter,
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Fetches request `id` into `dest_dir`, converting it to PDB when the
    /// declared type requires it.
    pub fn download_request(&self, id: &str, dest_dir: &Path) -> JobResult<DownloadedRequest> {
        let stat = retry(&self.retry, "stat_request", StoreError::is_transient, || {
            self.store.stat_object(REQUEST_BUCKET, id)
        })
        .map_err(|e| JobError::internal(format!("stat {REQUEST_BUCKET}/{id}: {e}")))?;

        let declared = stat.metadata_value(FILE_TYPE_METADATA_KEY).ok_or_else(|| {
            JobError::internal(format!(
                "request {id} has no {FILE_TYPE_METADATA_KEY} metadata"
            ))
        })?;
        let file_type = FileType::parse(declared)
            .map_err(|e| JobError::internal(format!("request {id}: {e}")))?;

        let bytes = retry(&self.retry, "get_request", StoreError::is_transient, || {
            self.store.get_object(REQUEST_BUCKET, id)
        })
        .map_err(|e| JobError::internal(format!("get {REQUEST_BUCKET}/{id}: {e}")))?;

        let stem = local_file_stem(id);
        let path = dest_dir.join(format!("{stem}.{}", file_type.extension()));
        fs::write(&path, &bytes)
            .map_err(|e| JobError::internal(format!("write {}: {e}", path.display())))?;
        debug!(request = id, %file_type, bytes = bytes.len(), "request downloaded");

        if !file_type.needs_conversion() {
            return Ok(DownloadedRequest { path, file_type });
        }
        let converted = dest_dir.join(format!("{stem}.converted.pdb"));
        self.converter.convert(&path, &converted)?;
        Ok(DownloadedRequest {
            path: converted,
            file_type,
        })
    }

    /// Best effort. An already absent request counts as deleted.
    pub fn delete_request(&self, id: &str) {
        let outcome = retry(&self.retry, "delete_request", StoreError::is_transient, || {
            match self.store.remove_object(REQUEST_BUCKET, id) {
                Err(err) if err.is_not_found() => Ok(()),
                other => other,
            }
        });
        match outcome {
            Ok(()) => debug!(request = id, "request deleted"),
            Err(err) => error!(request = id, error = %err, "failed to delete request"),
        }
    }

    /// Best effort. Writes `{id}.json`, empty with an `sqc-error` tag for
    /// failed jobs.
    pub fn write_response(&self, id: &str, response: &SqcResponse) {
        let (body, error_text) = match response.body() {
            Ok(body) => (body, response.error().map(str::to_string)),
            Err(err) => {
                error!(request = id, error = %err, "failed to encode result");
                (Vec::new(), Some(sqc_core::INTERNAL_ERROR_MESSAGE.to_string()))
            }
        };
        let mut metadata = ObjectMetadata::new();
        if let Some(text) = error_text {
            if text.len() > ERROR_METADATA_MAX_BYTES {
                error!(request = id, error = %text, "error tag truncated");
            }
            metadata.insert(ERROR_METADATA_KEY.to_string(), header_safe(&text));
        }
        let key = result_key(id);
        let outcome = retry(&self.retry, "write_response", StoreError::is_transient, || {
            self.store.put_object(RESULT_BUCKET, &key, &body, &metadata)
        });
        match outcome {
            Ok(()) => info!(
                request = id,
                key = %key,
                failed = response.error().is_some(),
                "response written"
            ),
            Err(err) => error!(request = id, error = %err, "failed to write response"),
        }
    }

    /// Stores a request the way the submission front end does.
    pub fn submit_request(
        &self,
        id: &str,
        bytes: &[u8],
        file_type: FileType,
    ) -> Result<(), StoreError> {
        let mut metadata = ObjectMetadata::new();
        metadata.insert(
            FILE_TYPE_METADATA_KEY.to_string(),
            file_type.as_str().to_string(),
        );
        retry(&self.retry, "submit_request", StoreError::is_transient, || {
            self.store.put_object(REQUEST_BUCKET, id, bytes, &metadata)
        })
    }

    /// Reads back the result object for `id` with its error tag.
    pub fn fetch_response(&self, id: &str) -> Result<StoredResponse, StoreError> {
        let key = result_key(id);
        let stat = self.store.stat_object(RESULT_BUCKET, &key)?;
        let body = self.store.get_object(RESULT_BUCKET, &key)?;
        Ok(StoredResponse {
            body,
            error: stat.metadata_value(ERROR_METADATA_KEY).map(str::to_string),
        })
    }

    pub fn request_exists(&self, id: &str) -> Result<bool, StoreError> {
        match self.store.stat_object(REQUEST_BUCKET, id) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Metadata travels as HTTP headers, which only carry visible ASCII.
const TRUNCATION_MARK: &str = "...";

/// Visible ASCII only, at most [`ERROR_METADATA_MAX_BYTES`] long.
fn header_safe(text: &str) -> String {
    let mut tag: String = text
        .chars()
        .map(|c| if c == ' ' || c.is_ascii_graphic() { c } else { '?' })
        .collect();
    if tag.len() > ERROR_METADATA_MAX_BYTES {
        tag.truncate(ERROR_METADATA_MAX_BYTES - TRUNCATION_MARK.len());
        tag.push_str(TRUNCATION_MARK);
    }
    tag
}
