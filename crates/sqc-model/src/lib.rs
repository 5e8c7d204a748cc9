#![forbid(unsafe_code)]
//! SQC result model.
//!
//! These types are the persisted response body. Field names are snake_case
//! and absent optional fields are omitted from the JSON, so a result read
//! back from the results bucket compares equal to the one that was written.

mod request;
mod residue;
mod result;

pub use request::{FileType, ParseError};
pub use residue::{
    Atom, OmegaTorsion, RamaTorsion, Residue, ResidueId, SidechainTorsion, WorstBondAngle,
    WorstBondLength, WorstClash,
};
pub use result::{
    Clash, DataVersion, Model, MolProbityVersions, SqcResponse, Status, ValidationResult,
    REFERENCE_DATASET_COUNT, UNKNOWN_PDB_ID,
};

pub const CRATE_NAME: &str = "sqc-model";
