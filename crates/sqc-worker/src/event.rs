// SPDX-License-Identifier: Apache-2.0

//! Bucket notifications as delivered on the `requests` queue.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use sqc_store::paths::{OBJECT_CREATED_EVENTS, OBJECT_CREATED_PUT};
use thiserror::Error;

/// Characters the object store leaves unescaped in notification keys.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "EventName")]
    pub event_name: String,
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Entity {
    pub object: S3Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Object {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EventError {
    #[error("event body is not a notification envelope: {0}")]
    Malformed(String),
    #[error("{0} event carries no records")]
    NoRecords(String),
    #[error("object key {0:?} does not decode")]
    BadKey(String),
}

/// What a delivery asks the worker to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestEvent {
    Created { request_id: String },
    Ignored { event_name: String },
}

#[must_use]
pub fn is_creation_event(event_name: &str) -> bool {
    OBJECT_CREATED_EVENTS.contains(&event_name)
}

/// Object keys arrive form-encoded: `+` is a space, the rest is percent-encoded.
pub fn decode_object_key(raw: &str) -> Result<String, EventError> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|_| EventError::BadKey(raw.to_string()))
}

pub fn parse_event(body: &[u8]) -> Result<RequestEvent, EventError> {
    let envelope: EventEnvelope =
        serde_json::from_slice(body).map_err(|e| EventError::Malformed(e.to_string()))?;
    if !is_creation_event(&envelope.event_name) {
        return Ok(RequestEvent::Ignored {
            event_name: envelope.event_name,
        });
    }
    let record = envelope
        .records
        .first()
        .ok_or_else(|| EventError::NoRecords(envelope.event_name.clone()))?;
    let request_id = decode_object_key(&record.s3.object.key)?;
    if request_id.is_empty() {
        return Err(EventError::BadKey(record.s3.object.key.clone()));
    }
    Ok(RequestEvent::Created { request_id })
}

/// Notification body announcing that `key` was uploaded with a single PUT.
#[must_use]
pub fn creation_event(key: &str) -> Vec<u8> {
    let envelope = EventEnvelope {
        event_name: OBJECT_CREATED_PUT.to_string(),
        records: vec![EventRecord {
            s3: S3Entity {
                object: S3Object {
                    key: utf8_percent_encode(key, KEY_ENCODE_SET).to_string(),
                },
            },
        }],
    };
    serde_json::to_vec(&envelope).unwrap_or_default()
}
