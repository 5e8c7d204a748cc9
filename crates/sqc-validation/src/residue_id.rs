// SPDX-License-Identifier: Apache-2.0

//! Residue and atom identifiers as printed by the MolProbity tools.
//!
//! Both tools print a single-character chain followed by the residue
//! number. Once the number reaches four digits it runs into the chain
//! column, so `"X 1194 TYR"` comes out as `"X1194 TYR"`.

use crate::error::OutputParseError;
use sqc_model::{Atom, ResidueId};

/// Width of the first token when chain and a four digit number are fused.
const FUSED_TOKEN_LEN: usize = 5;

fn residue_error(raw: &str, reason: &'static str) -> OutputParseError {
    OutputParseError::ResidueId {
        raw: raw.to_string(),
        reason,
    }
}

fn atom_error(raw: &str, reason: &'static str) -> OutputParseError {
    OutputParseError::ClashAtom {
        raw: raw.to_string(),
        reason,
    }
}

fn single_char(token: &str) -> Option<char> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn residue_number(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Splits a fused `"X1194"` token into chain and number. Only numbers of
/// four or more digits run into the chain column.
fn fused_chain_number(token: &str) -> Option<(char, u32)> {
    let mut chars = token.chars();
    let chain = chars.next()?;
    let number = chars.as_str();
    if number.len() < FUSED_TOKEN_LEN - 1 {
        return None;
    }
    Some((chain, residue_number(number)?))
}

/// Decomposes `"A 9 LYS"`, `"X1194 TYR"` or `"A 9 ALYS"` (alternate
/// location `A`) into a [`ResidueId`].
pub fn decompose_residue_id(raw: &str) -> Result<ResidueId, OutputParseError> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let (chain, number, residue_type) = match tokens.as_slice() {
        [chain, number, residue_type] => {
            let chain = single_char(chain)
                .ok_or_else(|| residue_error(raw, "chain is not one character"))?;
            let number = residue_number(number).ok_or_else(|| {
                residue_error(raw, "residue number is not a non-negative integer")
            })?;
            (chain, number, *residue_type)
        }
        [fused, residue_type] => {
            let (chain, number) = fused_chain_number(fused)
                .ok_or_else(|| residue_error(raw, "fused chain and number do not parse"))?;
            (chain, number, *residue_type)
        }
        _ => return Err(residue_error(raw, "expected two or three fields")),
    };

    let id = match residue_type.chars().count() {
        1..=3 => ResidueId::new(chain, number, residue_type),
        4 => {
            let mut chars = residue_type.chars();
            let alt = chars
                .next()
                .ok_or_else(|| residue_error(raw, "empty residue type"))?;
            ResidueId::new(chain, number, chars.as_str()).with_alt_code(alt)
        }
        _ => return Err(residue_error(raw, "residue type is too long")),
    };
    Ok(id)
}

/// Decomposes a clash atom descriptor such as `"A   9  LYS  CA"` or
/// `"X1034  ASP  C"`.
pub fn decompose_clash_atom(raw: &str) -> Result<Atom, OutputParseError> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let first = tokens
        .first()
        .ok_or_else(|| atom_error(raw, "descriptor is empty"))?;

    let (chain, residue_number, atom) = if first.chars().count() == FUSED_TOKEN_LEN {
        let [fused, _residue_type, atom] = tokens.as_slice() else {
            return Err(atom_error(raw, "expected chain+number, residue and atom"));
        };
        let (chain, number) = fused_chain_number(fused)
            .ok_or_else(|| atom_error(raw, "fused chain and number do not parse"))?;
        (chain, number, *atom)
    } else {
        let [chain, number, _residue_type, atom] = tokens.as_slice() else {
            return Err(atom_error(raw, "expected chain, number, residue and atom"));
        };
        let chain =
            single_char(chain).ok_or_else(|| atom_error(raw, "chain is not one character"))?;
        let number = residue_number(number)
            .ok_or_else(|| atom_error(raw, "residue number is not a non-negative integer"))?;
        (chain, number, *atom)
    };

    Ok(Atom {
        chain,
        residue_number,
        atom: atom.to_string(),
    })
}
