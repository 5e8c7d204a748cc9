// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreErrorCode {
    NotFound,
    Validation,
    Conflict,
    Network,
    Io,
    Unsupported,
    Internal,
}

impl StoreErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation_error",
            Self::Conflict => "conflict",
            Self::Network => "network_error",
            Self::Io => "io_error",
            Self::Unsupported => "unsupported",
            Self::Internal => "internal_error",
        }
    }

    /// Network and filesystem hiccups are worth another attempt.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::Io)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub code: StoreErrorCode,
    pub message: String,
}

impl StoreError {
    #[must_use]
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code == StoreErrorCode::NotFound
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreMetrics {
    pub bytes_downloaded: u64,
    pub bytes_uploaded: u64,
    pub request_count: u64,
    pub latency_ms_total: u128,
    pub failures_by_class: BTreeMap<String, u64>,
}

pub trait StoreInstrumentation: Send + Sync + 'static {
    fn observe_download(&self, _backend: &str, _bytes: usize, _latency: Duration) {}
    fn observe_upload(&self, _backend: &str, _bytes: usize, _latency: Duration) {}
    fn observe_error(&self, _backend: &str, _code: StoreErrorCode) {}
}

#[derive(Default)]
pub struct NoopInstrumentation;

impl StoreInstrumentation for NoopInstrumentation {}

#[derive(Default)]
pub struct StoreMetricsCollector {
    inner: Mutex<StoreMetrics>,
}

impl StoreMetricsCollector {
    #[must_use]
    pub fn snapshot(&self) -> StoreMetrics {
        self.inner.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl StoreInstrumentation for StoreMetricsCollector {
    fn observe_download(&self, _backend: &str, bytes: usize, latency: Duration) {
        if let Ok(mut m) = self.inner.lock() {
            m.bytes_downloaded = m.bytes_downloaded.saturating_add(bytes as u64);
            m.request_count = m.request_count.saturating_add(1);
            m.latency_ms_total = m.latency_ms_total.saturating_add(latency.as_millis());
        }
    }

    fn observe_upload(&self, _backend: &str, bytes: usize, latency: Duration) {
        if let Ok(mut m) = self.inner.lock() {
            m.bytes_uploaded = m.bytes_uploaded.saturating_add(bytes as u64);
            m.request_count = m.request_count.saturating_add(1);
            m.latency_ms_total = m.latency_ms_total.saturating_add(latency.as_millis());
        }
    }

    fn observe_error(&self, _backend: &str, code: StoreErrorCode) {
        if let Ok(mut m) = self.inner.lock() {
            m.request_count = m.request_count.saturating_add(1);
            *m.failures_by_class
                .entry(code.as_str().to_string())
                .or_insert(0) += 1;
        }
    }
}

/// User metadata keys are compared case-insensitively by S3, so every
/// backend stores and returns them lowercased.
pub type ObjectMetadata = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectStat {
    pub size: u64,
    pub metadata: ObjectMetadata,
}

impl ObjectStat {
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Bucket notification forwarding object events to a message queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: String,
    pub queue_arn: String,
    pub events: Vec<String>,
}

impl NotificationRule {
    /// S3 `NotificationConfiguration` document for `PUT ?notification`.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::from(
            "<NotificationConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">",
        );
        out.push_str("<QueueConfiguration>");
        out.push_str(&format!("<Id>{}</Id>", xml_escape(&self.id)));
        out.push_str(&format!("<Queue>{}</Queue>", xml_escape(&self.queue_arn)));
        for event in &self.events {
            out.push_str(&format!("<Event>{}</Event>", xml_escape(event)));
        }
        out.push_str("</QueueConfiguration></NotificationConfiguration>");
        out
    }
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub trait ObjectStore: Send + Sync {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError>;
    fn make_bucket(&self, bucket: &str) -> Result<(), StoreError>;
    fn set_bucket_notification(
        &self,
        bucket: &str,
        rule: &NotificationRule,
    ) -> Result<(), StoreError>;
    fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat, StoreError>;
    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        metadata: &ObjectMetadata,
    ) -> Result<(), StoreError>;
    fn remove_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Create-if-absent. Racing creators both succeed.
    fn ensure_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        if self.bucket_exists(bucket)? {
            return Ok(());
        }
        match self.make_bucket(bucket) {
            Err(err) if err.code == StoreErrorCode::Conflict => Ok(()),
            other => other,
        }
    }
}

/// Rejects keys that could escape a bucket or collide with backend files.
pub fn validate_object_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::new(
            StoreErrorCode::Validation,
            "object key must not be empty",
        ));
    }
    if key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(StoreError::new(
            StoreErrorCode::Validation,
            format!("object key {key:?} is not a relative path"),
        ));
    }
    Ok(())
}
