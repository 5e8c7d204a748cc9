// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

pub type JobResult<T> = Result<T, JobError>;

/// Text handed to requesters for failures that are not their fault.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// Job-level failures. Each one aborts the current request only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum JobError {
    /// The structure could not be converted to PDB.
    #[error("conversion failed: {0}")]
    Conversion(String),
    /// An analysis step produced output that invalidates the whole job.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Storage or tooling misbehaved independently of the submitted input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl JobError {
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Conversion(_) => "conversion_error",
            Self::Validation(_) => "validation_error",
            Self::Internal(_) => "internal_error",
        }
    }

    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Message written to the result object. Internal detail stays in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = JobError::internal("stat requests/42: connection reset");
        assert_eq!(err.public_message(), INTERNAL_ERROR_MESSAGE);
        assert!(err.to_string().contains("connection reset"));
        assert!(err.is_internal());
    }

    #[test]
    fn requester_errors_keep_their_detail() {
        let err = JobError::conversion("gemmi did not finish within 60s");
        assert_eq!(
            err.public_message(),
            "conversion failed: gemmi did not finish within 60s"
        );
        assert_eq!(err.code(), "conversion_error");
        assert!(!err.is_internal());
        assert_eq!(JobError::validation("x").code(), "validation_error");
    }
}
