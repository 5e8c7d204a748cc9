// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Atom {
    pub chain: char,
    pub residue_number: u32,
    pub atom: String,
}

/// Identity of a residue inside one model.
///
/// Worst-clash records point at their partner through a `ResidueId` value,
/// never through the partner `Residue` itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResidueId {
    pub number: u32,
    pub chain: char,
    pub residue_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_code: Option<char>,
}

impl ResidueId {
    pub fn new(chain: char, number: u32, residue_type: impl Into<String>) -> Self {
        Self {
            number,
            chain,
            residue_type: residue_type.into(),
            alt_code: None,
        }
    }

    #[must_use]
    pub fn with_alt_code(mut self, alt_code: char) -> Self {
        self.alt_code = Some(alt_code);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstClash {
    pub magnitude: f64,
    pub atom: String,
    pub other_atom: String,
    pub other_residue: ResidueId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstBondLength {
    pub first_atom: String,
    pub second_atom: String,
    pub length: f64,
    pub sigma: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstBondAngle {
    pub first_atom: String,
    pub second_atom: String,
    pub third_atom: String,
    pub angle: f64,
    pub sigma: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmegaTorsion {
    pub angle: f64,
    pub angle_range: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamaTorsion {
    pub angle_combo_range: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidechainTorsion {
    pub angle_range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotamer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Residue {
    #[serde(flatten)]
    pub id: ResidueId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst_clash: Option<WorstClash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond_length_outlier_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst_bond_length: Option<WorstBondLength>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond_angle_outlier_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst_bond_angle: Option<WorstBondAngle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omega_torsion: Option<OmegaTorsion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rama_torsion: Option<RamaTorsion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidechain_torsion: Option<SidechainTorsion>,
}

impl Residue {
    #[must_use]
    pub fn new(id: ResidueId) -> Self {
        Self {
            id,
            worst_clash: None,
            bond_length_outlier_count: None,
            worst_bond_length: None,
            bond_angle_outlier_count: None,
            worst_bond_angle: None,
            omega_torsion: None,
            rama_torsion: None,
            sidechain_torsion: None,
        }
    }

    /// True when the analyzer attached at least one outlier to this residue.
    #[must_use]
    pub fn has_outliers(&self) -> bool {
        self.worst_clash.is_some()
            || self.bond_length_outlier_count.is_some()
            || self.bond_angle_outlier_count.is_some()
            || self.omega_torsion.is_some()
            || self.rama_torsion.is_some()
            || self.sidechain_torsion.is_some()
    }
}
