// SPDX-License-Identifier: Apache-2.0

use crate::molprobity::MolProbity;
use crate::provenance::ProvenanceSource;
use crate::split::split_models;
use sqc_core::JobResult;
use sqc_model::{Model, Status, ValidationResult};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info_span};

/// Validates PDB files model by model.
#[derive(Clone)]
pub struct Validator {
    molprobity: MolProbity,
    provenance: Arc<dyn ProvenanceSource>,
}

impl Validator {
    pub fn new(molprobity: MolProbity, provenance: Arc<dyn ProvenanceSource>) -> Self {
        Self {
            molprobity,
            provenance,
        }
    }

    #[must_use]
    pub fn molprobity(&self) -> &MolProbity {
        &self.molprobity
    }

    /// Splits `path` into models and runs both analyses on each.
    ///
    /// A status flag is false when its analysis did not finish for some
    /// model; that model's field is left empty.
    pub fn validate(&self, path: &Path) -> JobResult<ValidationResult> {
        let split = split_models(path)?;
        let mut residue_analysis = true;
        let mut clash_analysis = true;
        let mut models = Vec::with_capacity(split.models.len());

        for (number, model_path) in &split.models {
            let _span = info_span!("model", model = *number).entered();
            let residues = self.molprobity.residue_analysis(model_path)?;
            let clashes = self.molprobity.clashscore(model_path)?;
            residue_analysis &= residues.is_completed();
            clash_analysis &= clashes.is_completed();

            let model = Model {
                number: *number,
                residues: residues.completed(),
                clashes: clashes.completed(),
            };
            debug!(
                residues = model.residues.as_ref().map(Vec::len),
                clashes = model.clashes.as_ref().map(Vec::len),
                "model analysed"
            );
            models.push(model);
        }
        models.sort_by_key(|model| model.number);

        Ok(ValidationResult {
            status: Status {
                residue_analysis,
                clash_analysis,
                molprobity_versions: self.provenance.versions()?,
            },
            pdb_id: split.pdb_id,
            models,
        })
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("molprobity", &self.molprobity)
            .finish_non_exhaustive()
    }
}
