// SPDX-License-Identifier: Apache-2.0

pub const REQUEST_BUCKET: &str = "requests";
pub const RESULT_BUCKET: &str = "results";

pub const FILE_TYPE_METADATA_KEY: &str = "file-type";
pub const ERROR_METADATA_KEY: &str = "sqc-error";
/// S3 caps all user metadata of an object at 2 KiB.
pub const ERROR_METADATA_MAX_BYTES: usize = 1024;

pub const OBJECT_CREATED_PUT: &str = "s3:ObjectCreated:Put";
pub const OBJECT_CREATED_MULTIPART: &str = "s3:ObjectCreated:CompleteMultipartUpload";
pub const OBJECT_CREATED_EVENTS: [&str; 2] = [OBJECT_CREATED_PUT, OBJECT_CREATED_MULTIPART];

pub const DEFAULT_NOTIFICATION_ARN: &str = "arn:minio:sqs::PRIMARY:amqp";
pub const NOTIFICATION_RULE_ID: &str = "sqc-requests";

#[must_use]
pub fn result_key(request_id: &str) -> String {
    format!("{request_id}.json")
}

/// Request ids are object keys and may contain `/`; local copies are flat.
#[must_use]
pub fn local_file_stem(request_id: &str) -> String {
    request_id.replace('/', "__")
}
