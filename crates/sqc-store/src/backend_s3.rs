// SPDX-License-Identifier: Apache-2.0

use crate::backend::{
    validate_object_key, NoopInstrumentation, NotificationRule, ObjectMetadata, ObjectStat,
    ObjectStore, StoreError, StoreErrorCode, StoreInstrumentation,
};
use crate::sigv4::{RequestSigner, S3Credentials};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};

const BACKEND: &str = "s3like";
const METADATA_HEADER_PREFIX: &str = "x-amz-meta-";

/// Everything outside the S3 unreserved set is escaped in key segments.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Path-style S3 HTTP client (MinIO and compatible servers). Requests are
/// SigV4-signed when credentials are set and anonymous otherwise.
pub struct S3LikeStore {
    pub endpoint: String,
    signer: Option<RequestSigner>,
    client: Client,
    instrumentation: Arc<dyn StoreInstrumentation>,
}

impl S3LikeStore {
    #[must_use]
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            signer: None,
            client: Client::new(),
            instrumentation: Arc::new(NoopInstrumentation),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<&S3Credentials>) -> Self {
        self.signer = credentials.map(RequestSigner::new);
        self
    }

    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        self
    }

    #[must_use]
    pub fn with_instrumentation(mut self, instrumentation: Arc<dyn StoreInstrumentation>) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/{}", self.endpoint, bucket)
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        let path: Vec<String> = key
            .trim_start_matches('/')
            .split('/')
            .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
            .collect();
        format!("{}/{}/{}", self.endpoint, bucket, path.join("/"))
    }

    /// Builds, signs and sends one request. `headers` are covered by the
    /// signature.
    fn execute(
        &self,
        method: Method,
        url: &str,
        headers: Vec<(HeaderName, HeaderValue)>,
        body: Option<Vec<u8>>,
        what: &str,
    ) -> Result<Response, StoreError> {
        let mut req = self.client.request(method.clone(), url);
        if let Some(signer) = &self.signer {
            let payload = body.as_deref().unwrap_or_default();
            for (name, value) in signer.sign(&method, url, &headers, payload)? {
                req = req.header(name, value);
            }
        }
        for (name, value) in headers {
            req = req.header(name, value);
        }
        if let Some(body) = body {
            req = req.body(body);
        }
        self.send(req, what)
    }

    fn send(&self, req: RequestBuilder, what: &str) -> Result<Response, StoreError> {
        req.send().map_err(|e| {
            self.instrumentation
                .observe_error(BACKEND, StoreErrorCode::Network);
            StoreError::new(StoreErrorCode::Network, format!("{what}: {e}"))
        })
    }

    fn status_error(&self, status: StatusCode, what: &str) -> StoreError {
        let code = match status.as_u16() {
            404 => StoreErrorCode::NotFound,
            409 => StoreErrorCode::Conflict,
            408 | 429 => StoreErrorCode::Network,
            s if s >= 500 => StoreErrorCode::Network,
            _ => StoreErrorCode::Internal,
        };
        self.instrumentation.observe_error(BACKEND, code);
        StoreError::new(code, format!("{what}: status {status}"))
    }
}

fn metadata_headers(
    metadata: &ObjectMetadata,
) -> Result<Vec<(HeaderName, HeaderValue)>, StoreError> {
    metadata
        .iter()
        .map(|(key, value)| {
            let name = HeaderName::from_bytes(
                format!("{METADATA_HEADER_PREFIX}{}", key.to_ascii_lowercase()).as_bytes(),
            )
            .map_err(|e| StoreError::new(StoreErrorCode::Validation, e.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StoreError::new(StoreErrorCode::Validation, e.to_string()))?;
            Ok((name, value))
        })
        .collect()
}

fn read_metadata(resp: &Response) -> ObjectMetadata {
    resp.headers()
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(METADATA_HEADER_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

impl ObjectStore for S3LikeStore {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        let what = format!("HEAD bucket {bucket}");
        let resp = self.execute(Method::HEAD, &self.bucket_url(bucket), Vec::new(), None, &what)?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            s if s == StatusCode::NOT_FOUND => Ok(false),
            s => Err(self.status_error(s, &what)),
        }
    }

    fn make_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let what = format!("PUT bucket {bucket}");
        let resp = self.execute(Method::PUT, &self.bucket_url(bucket), Vec::new(), None, &what)?;
        if resp.status().is_success() {
            return Ok(());
        }
        Err(self.status_error(resp.status(), &what))
    }

    fn set_bucket_notification(
        &self,
        bucket: &str,
        rule: &NotificationRule,
    ) -> Result<(), StoreError> {
        let what = format!("PUT notification {bucket}");
        let url = format!("{}?notification", self.bucket_url(bucket));
        let headers = vec![(CONTENT_TYPE, HeaderValue::from_static("application/xml"))];
        let body = rule.to_xml().into_bytes();
        let resp = self.execute(Method::PUT, &url, headers, Some(body), &what)?;
        if resp.status().is_success() {
            return Ok(());
        }
        Err(self.status_error(resp.status(), &what))
    }

    fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat, StoreError> {
        validate_object_key(key)?;
        let what = format!("HEAD {bucket}/{key}");
        let url = self.object_url(bucket, key);
        let resp = self.execute(Method::HEAD, &url, Vec::new(), None, &what)?;
        if !resp.status().is_success() {
            return Err(self.status_error(resp.status(), &what));
        }
        let size = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        Ok(ObjectStat {
            size,
            metadata: read_metadata(&resp),
        })
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        validate_object_key(key)?;
        let started = Instant::now();
        let what = format!("GET {bucket}/{key}");
        let url = self.object_url(bucket, key);
        let resp = self.execute(Method::GET, &url, Vec::new(), None, &what)?;
        if !resp.status().is_success() {
            return Err(self.status_error(resp.status(), &what));
        }
        let bytes = resp
            .bytes()
            .map_err(|e| StoreError::new(StoreErrorCode::Network, format!("{what}: {e}")))?
            .to_vec();
        self.instrumentation
            .observe_download(BACKEND, bytes.len(), started.elapsed());
        Ok(bytes)
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        metadata: &ObjectMetadata,
    ) -> Result<(), StoreError> {
        validate_object_key(key)?;
        let started = Instant::now();
        let what = format!("PUT {bucket}/{key}");
        let url = self.object_url(bucket, key);
        let headers = metadata_headers(metadata)?;
        let resp = self.execute(Method::PUT, &url, headers, Some(bytes.to_vec()), &what)?;
        if !resp.status().is_success() {
            return Err(self.status_error(resp.status(), &what));
        }
        self.instrumentation
            .observe_upload(BACKEND, bytes.len(), started.elapsed());
        Ok(())
    }

    /// S3 answers 204 for absent keys; servers that answer 404 surface
    /// `NotFound` like the local backend.
    fn remove_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        validate_object_key(key)?;
        let what = format!("DELETE {bucket}/{key}");
        let url = self.object_url(bucket, key);
        let resp = self.execute(Method::DELETE, &url, Vec::new(), None, &what)?;
        if resp.status().is_success() {
            return Ok(());
        }
        Err(self.status_error(resp.status(), &what))
    }
}
