// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod clashscore;
mod error;
mod molprobity;
mod provenance;
mod residue_analysis;
mod residue_id;
mod split;
mod validator;

pub const CRATE_NAME: &str = "sqc-validation";

pub use clashscore::{parse_clashscore, CLASH_ATOMS_WIDTH};
pub use error::OutputParseError;
pub use molprobity::{
    AnalysisOutcome, MolProbity, ToolFailure, CLASHSCORE_TOOL, DEFAULT_ANALYSIS_TIMEOUT,
    RESIDUE_ANALYSIS_TOOL,
};
pub use provenance::{
    GitProvenance, ProvenanceSource, StaticProvenance, DEFAULT_REFERENCE_DATA_ROOT,
    REFERENCE_DATASETS,
};
pub use residue_analysis::parse_residue_analysis;
pub use residue_id::{decompose_clash_atom, decompose_residue_id};
pub use split::{model_path, split_models, SplitStructure};
pub use validator::Validator;
