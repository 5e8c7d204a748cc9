// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    Empty(&'static str),
    InvalidFormat(String),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty(name) => write!(f, "{name} must not be empty"),
            Self::InvalidFormat(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ParseError {}

/// Declared format of a submitted structure, carried in object metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdb,
    Mmcif,
}

impl FileType {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(ParseError::Empty("file type"));
        }
        match value.to_ascii_lowercase().as_str() {
            "pdb" => Ok(Self::Pdb),
            "mmcif" | "cif" => Ok(Self::Mmcif),
            other => Err(ParseError::InvalidFormat(format!(
                "unsupported file type {other:?}; expected pdb or mmcif"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdb => "pdb",
            Self::Mmcif => "mmcif",
        }
    }

    /// File extension used for the downloaded copy of a request.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Pdb => "pdb",
            Self::Mmcif => "cif",
        }
    }

    /// Only PDB input can be fed to the analyzers directly.
    #[must_use]
    pub const fn needs_conversion(self) -> bool {
        !matches!(self, Self::Pdb)
    }
}

impl Display for FileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
