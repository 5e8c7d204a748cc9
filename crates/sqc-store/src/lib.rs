// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod backend;
mod backend_local;
mod backend_s3;
mod convert;
mod gateway;
pub mod paths;
mod retry;
mod sigv4;

pub const CRATE_NAME: &str = "sqc-store";

pub use backend::{
    validate_object_key, NoopInstrumentation, NotificationRule, ObjectMetadata, ObjectStat,
    ObjectStore, StoreError, StoreErrorCode, StoreInstrumentation, StoreMetrics,
    StoreMetricsCollector,
};
pub use backend_local::{LocalFsStore, METADATA_SUFFIX, NOTIFICATION_FILE};
pub use backend_s3::S3LikeStore;
pub use convert::{
    ConverterOutput, FormatConverter, DEFAULT_CONVERTER_COMMAND, DEFAULT_CONVERT_TIMEOUT,
};
pub use gateway::{DownloadedRequest, GatewayConfig, RequestGateway, StoredResponse};
pub use retry::{retry, BackoffPolicy, RetryPolicy};
pub use sigv4::{S3Credentials, DEFAULT_S3_REGION};
