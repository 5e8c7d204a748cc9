// SPDX-License-Identifier: Apache-2.0

//! AWS Signature Version 4 header signing for the S3 backend.

use crate::backend::{StoreError, StoreErrorCode};
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, PayloadChecksumKind, PercentEncodingMode, SignableBody, SignableRequest,
    SigningParams, SigningSettings, UriPathNormalizationMode,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use std::fmt;
use std::time::SystemTime;

/// MinIO ignores the region but it is part of every signature.
pub const DEFAULT_S3_REGION: &str = "us-east-1";
const SERVICE: &str = "s3";

/// Static access key pair, as MinIO hands them out.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl S3Credentials {
    #[must_use]
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: DEFAULT_S3_REGION.to_string(),
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

fn signing_error(err: impl fmt::Display) -> StoreError {
    StoreError::new(
        StoreErrorCode::Internal,
        format!("request signing failed: {err}"),
    )
}

pub(crate) struct RequestSigner {
    identity: Identity,
    region: String,
}

impl RequestSigner {
    pub(crate) fn new(credentials: &S3Credentials) -> Self {
        let identity = Credentials::new(
            credentials.access_key.clone(),
            credentials.secret_key.clone(),
            None,
            None,
            "static",
        )
        .into();
        Self {
            identity,
            region: credentials.region.clone(),
        }
    }

    /// Headers to add so `method url` with `headers` and `body` passes
    /// SigV4 verification. `url` must already be percent-encoded.
    pub(crate) fn sign(
        &self,
        method: &Method,
        url: &str,
        headers: &[(HeaderName, HeaderValue)],
        body: &[u8],
    ) -> Result<Vec<(HeaderName, HeaderValue)>, StoreError> {
        self.sign_at(SystemTime::now(), method, url, headers, body)
    }

    fn sign_at(
        &self,
        time: SystemTime,
        method: &Method,
        url: &str,
        headers: &[(HeaderName, HeaderValue)],
        body: &[u8],
    ) -> Result<Vec<(HeaderName, HeaderValue)>, StoreError> {
        let mut settings = SigningSettings::default();
        settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
        settings.percent_encoding_mode = PercentEncodingMode::Single;
        settings.uri_path_normalization_mode = UriPathNormalizationMode::Disabled;
        let params: SigningParams<'_> = v4::SigningParams::builder()
            .identity(&self.identity)
            .region(&self.region)
            .name(SERVICE)
            .time(time)
            .settings(settings)
            .build()
            .map_err(signing_error)?
            .into();

        let signed_headers = headers
            .iter()
            .map(|(name, value)| {
                value
                    .to_str()
                    .map(|value| (name.as_str(), value))
                    .map_err(signing_error)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let request = SignableRequest::new(
            method.as_str(),
            url,
            signed_headers.into_iter(),
            SignableBody::Bytes(body),
        )
        .map_err(signing_error)?;
        let (instructions, _signature) = sign(request, &params)
            .map_err(signing_error)?
            .into_parts();

        instructions
            .headers()
            .map(|(name, value)| {
                let name = HeaderName::from_bytes(name.as_bytes()).map_err(signing_error)?;
                let value = HeaderValue::from_str(value).map_err(signing_error)?;
                Ok((name, value))
            })
            .collect()
    }
}
