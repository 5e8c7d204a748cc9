// SPDX-License-Identifier: Apache-2.0

use crate::error::OutputParseError;
use crate::residue_id::decompose_residue_id;
use serde::Deserialize;
use sqc_model::{
    OmegaTorsion, RamaTorsion, Residue, SidechainTorsion, WorstBondAngle, WorstBondLength,
    WorstClash,
};
use std::collections::HashMap;

/// One row of `residue-analysis` CSV output. Empty cells read as `None`.
#[derive(Debug, Deserialize)]
struct AnalysisRow {
    residue: String,
    worst_clash: Option<f64>,
    src_atom: Option<String>,
    dst_atom: Option<String>,
    dst_residue: Option<String>,
    num_length_out: Option<u32>,
    worst_length: Option<String>,
    worst_length_value: Option<f64>,
    worst_length_sigma: Option<f64>,
    num_angle_out: Option<u32>,
    worst_angle: Option<String>,
    worst_angle_value: Option<f64>,
    worst_angle_sigma: Option<f64>,
    omega: Option<f64>,
    omega_eval: Option<String>,
    rama_eval: Option<String>,
    rotamer_eval: Option<String>,
    rotamer: Option<String>,
}

impl AnalysisRow {
    fn required<T: Clone>(&self, value: &Option<T>, column: &str) -> Result<T, OutputParseError> {
        value.clone().ok_or_else(|| OutputParseError::ResidueRow {
            residue: self.residue.clone(),
            message: format!("{column} is empty"),
        })
    }

    fn malformed(&self, message: String) -> OutputParseError {
        OutputParseError::ResidueRow {
            residue: self.residue.clone(),
            message,
        }
    }

    fn parse_worst_clash(&self) -> Result<Option<WorstClash>, OutputParseError> {
        let Some(magnitude) = self.worst_clash else {
            return Ok(None);
        };
        let other = self.required(&self.dst_residue, "dst_residue")?;
        Ok(Some(WorstClash {
            magnitude,
            atom: self.required(&self.src_atom, "src_atom")?,
            other_atom: self.required(&self.dst_atom, "dst_atom")?,
            other_residue: decompose_residue_id(&other)?,
        }))
    }

    fn parse_worst_bond_length(&self) -> Result<WorstBondLength, OutputParseError> {
        let atoms = self.required(&self.worst_length, "worst_length")?;
        let Some((first_atom, second_atom)) = atoms.split_once("--") else {
            return Err(self.malformed(format!("worst_length {atoms:?} is not atom--atom")));
        };
        Ok(WorstBondLength {
            first_atom: first_atom.to_string(),
            second_atom: second_atom.to_string(),
            length: self.required(&self.worst_length_value, "worst_length_value")?,
            sigma: self.required(&self.worst_length_sigma, "worst_length_sigma")?,
        })
    }

    fn parse_worst_bond_angle(&self) -> Result<WorstBondAngle, OutputParseError> {
        let atoms = self.required(&self.worst_angle, "worst_angle")?;
        let parts: Vec<&str> = atoms.split('-').collect();
        let [first_atom, second_atom, third_atom] = parts.as_slice() else {
            return Err(self.malformed(format!("worst_angle {atoms:?} is not atom-atom-atom")));
        };
        Ok(WorstBondAngle {
            first_atom: (*first_atom).to_string(),
            second_atom: (*second_atom).to_string(),
            third_atom: (*third_atom).to_string(),
            angle: self.required(&self.worst_angle_value, "worst_angle_value")?,
            sigma: self.required(&self.worst_angle_sigma, "worst_angle_sigma")?,
        })
    }

    fn into_residue(self) -> Result<Residue, OutputParseError> {
        let mut residue = Residue::new(decompose_residue_id(&self.residue)?);
        residue.worst_clash = self.parse_worst_clash()?;

        if let Some(count) = self.num_length_out {
            residue.bond_length_outlier_count = Some(count);
            residue.worst_bond_length = Some(self.parse_worst_bond_length()?);
        }
        if let Some(count) = self.num_angle_out {
            residue.bond_angle_outlier_count = Some(count);
            residue.worst_bond_angle = Some(self.parse_worst_bond_angle()?);
        }
        if let Some(angle) = self.omega {
            residue.omega_torsion = Some(OmegaTorsion {
                angle,
                angle_range: self.required(&self.omega_eval, "omega_eval")?,
            });
        }
        if let Some(angle_combo_range) = self.rama_eval.clone() {
            residue.rama_torsion = Some(RamaTorsion { angle_combo_range });
        }
        if let Some(angle_range) = self.rotamer_eval.clone() {
            residue.sidechain_torsion = Some(SidechainTorsion {
                angle_range,
                rotamer: self.rotamer.clone(),
            });
        }
        Ok(residue)
    }
}

/// Parses `residue-analysis` CSV into the residues that carry at least one
/// outlier, in output order. A residue printed twice keeps its first
/// position and its last row.
pub fn parse_residue_analysis(output: &str) -> Result<Vec<Residue>, OutputParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(output.as_bytes());

    let mut rows: Vec<AnalysisRow> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for record in reader.deserialize::<AnalysisRow>() {
        let row = record.map_err(|e| OutputParseError::Csv(e.to_string()))?;
        match positions.get(&row.residue) {
            Some(&index) => rows[index] = row,
            None => {
                positions.insert(row.residue.clone(), rows.len());
                rows.push(row);
            }
        }
    }

    let mut residues = Vec::with_capacity(rows.len());
    for row in rows {
        let residue = row.into_residue()?;
        if residue.has_outliers() {
            residues.push(residue);
        }
    }
    Ok(residues)
}
