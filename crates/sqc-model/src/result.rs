// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::residue::{Atom, Residue};

/// Structure identifier used when the file header carries none.
pub const UNKNOWN_PDB_ID: &str = "unknown_pdb_id";

/// Number of reference datasets bundled with MolProbity.
pub const REFERENCE_DATASET_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clash {
    pub first_atom: Atom,
    pub second_atom: Atom,
    pub magnitude: f64,
}

/// One model of the structure. `None` means the analysis that fills the
/// field did not complete for this model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residues: Option<Vec<Residue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clashes: Option<Vec<Clash>>,
}

impl Model {
    #[must_use]
    pub fn new(number: u32) -> Self {
        Self {
            number,
            residues: None,
            clashes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataVersion {
    pub url: String,
    pub commit_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MolProbityVersions {
    pub geostd_version: DataVersion,
    pub mon_lib_version: DataVersion,
    pub rotarama_version: DataVersion,
    pub cablam_version: DataVersion,
    pub rama_z_version: DataVersion,
}

impl MolProbityVersions {
    #[must_use]
    pub fn entries(&self) -> [(&'static str, &DataVersion); REFERENCE_DATASET_COUNT] {
        [
            ("geostd", &self.geostd_version),
            ("mon_lib", &self.mon_lib_version),
            ("rotarama", &self.rotarama_version),
            ("cablam", &self.cablam_version),
            ("rama_z", &self.rama_z_version),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub residue_analysis: bool,
    pub clash_analysis: bool,
    pub molprobity_versions: MolProbityVersions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: Status,
    pub pdb_id: String,
    pub models: Vec<Model>,
}

impl ValidationResult {
    pub fn to_json_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Outcome persisted for one request: a result or an error message.
#[derive(Debug, Clone, PartialEq)]
pub enum SqcResponse {
    Ok(ValidationResult),
    Err(String),
}

impl SqcResponse {
    #[must_use]
    pub fn ok(result: ValidationResult) -> Self {
        Self::Ok(result)
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self::Err(message.into())
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Err(message) => Some(message),
            Self::Ok(_) => None,
        }
    }

    #[must_use]
    pub fn result(&self) -> Option<&ValidationResult> {
        match self {
            Self::Ok(result) => Some(result),
            Self::Err(_) => None,
        }
    }

    /// Object body for the results bucket; empty when the job failed.
    pub fn body(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Ok(result) => result.to_json_vec(),
            Self::Err(_) => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(name: &str) -> DataVersion {
        DataVersion {
            url: format!("https://github.com/rlabduke/{name}.git"),
            commit_sha: "0f4e7b1c".to_string(),
        }
    }

    fn versions() -> MolProbityVersions {
        MolProbityVersions {
            geostd_version: version("geostd"),
            mon_lib_version: version("mon_lib"),
            rotarama_version: version("reference_data"),
            cablam_version: version("cablam"),
            rama_z_version: version("rama_z"),
        }
    }

    #[test]
    fn versions_expose_all_reference_datasets() {
        let versions = versions();
        let names: Vec<_> = versions.entries().iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec!["geostd", "mon_lib", "rotarama", "cablam", "rama_z"]
        );
    }

    #[test]
    fn error_response_has_empty_body() {
        let response = SqcResponse::err("conversion failed: timeout");
        assert_eq!(response.body().expect("body"), Vec::<u8>::new());
        assert_eq!(response.error(), Some("conversion failed: timeout"));
        assert!(response.result().is_none());
    }

    #[test]
    fn failed_analyses_are_omitted_from_model_json() {
        let mut model = Model::new(1);
        model.residues = Some(Vec::new());
        let value = serde_json::to_value(&model).expect("encode");
        assert_eq!(value, serde_json::json!({"number": 1, "residues": []}));
    }
}
