// SPDX-License-Identifier: Apache-2.0

use sqc_core::JobError;
use thiserror::Error;

/// Tool output that does not match the expected layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum OutputParseError {
    #[error("malformed residue identifier {raw:?}: {reason}")]
    ResidueId { raw: String, reason: &'static str },
    #[error("malformed clash atom {raw:?}: {reason}")]
    ClashAtom { raw: String, reason: &'static str },
    #[error("residue analysis: {0}")]
    Csv(String),
    #[error("residue analysis row for {residue}: {message}")]
    ResidueRow { residue: String, message: String },
    #[error("clashscore line {line}: {message}")]
    ClashLine { line: usize, message: String },
    #[error("clashscore output has only {0} lines")]
    TruncatedClashscore(usize),
}

impl From<OutputParseError> for JobError {
    fn from(err: OutputParseError) -> Self {
        JobError::validation(err.to_string())
    }
}
