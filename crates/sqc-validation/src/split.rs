// SPDX-License-Identifier: Apache-2.0

use pdbtbx::{Format, PDBError, ReadOptions, StrictnessLevel, PDB};
use sqc_core::{JobError, JobResult};
use sqc_model::UNKNOWN_PDB_ID;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A structure split into one PDB file per model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitStructure {
    pub pdb_id: String,
    /// `(model number, model file)` in ascending model order.
    pub models: Vec<(u32, PathBuf)>,
}

fn joined(errors: &[PDBError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Path of the file holding model `serial` of `path`.
#[must_use]
pub fn model_path(path: &Path, serial: u32) -> PathBuf {
    PathBuf::from(format!("{}-model-{serial}.pdb", path.display()))
}

/// Atoms outside any `MODEL` record belong to model 0; report it as 1.
fn model_number(serial: usize) -> JobResult<u32> {
    let number = u32::try_from(serial)
        .map_err(|_| JobError::validation(format!("model serial {serial} is out of range")))?;
    Ok(number.max(1))
}

fn read_structure(path: &Path) -> JobResult<PDB> {
    let file = File::open(path)
        .map_err(|e| JobError::internal(format!("open {}: {e}", path.display())))?;
    let (pdb, warnings) = ReadOptions::new()
        .set_format(Format::Pdb)
        .set_level(StrictnessLevel::Loose)
        .read_raw(BufReader::new(file))
        .map_err(|errors| {
            JobError::validation(format!("structure does not parse: {}", joined(&errors)))
        })?;
    if !warnings.is_empty() {
        debug!(path = %path.display(), warnings = warnings.len(), "structure parsed with warnings");
    }
    Ok(pdb)
}

fn write_model(pdb: &PDB, serial: usize, out: &Path) -> JobResult<()> {
    let mut single = pdb.clone();
    single.remove_models_by(|model| model.serial_number() != serial);
    let out_str = out
        .to_str()
        .ok_or_else(|| JobError::internal(format!("{} is not valid UTF-8", out.display())))?;
    pdbtbx::save_pdb(&single, out_str, StrictnessLevel::Loose)
        .map_err(|errors| JobError::internal(format!("write {out_str}: {}", joined(&errors))))
}

/// Splits the PDB file at `path` into `{path}-model-{serial}.pdb` files.
///
/// The identifier comes from the `HEADER` record, falling back to
/// [`UNKNOWN_PDB_ID`]. A structure without models is a validation error.
pub fn split_models(path: &Path) -> JobResult<SplitStructure> {
    let pdb = read_structure(path)?;
    let pdb_id = pdb
        .identifier
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(UNKNOWN_PDB_ID)
        .to_string();

    let mut serials: Vec<usize> = pdb.models().map(|model| model.serial_number()).collect();
    serials.sort_unstable();
    serials.dedup();
    if serials.is_empty() {
        return Err(JobError::validation("structure contains no models"));
    }

    let mut models = Vec::with_capacity(serials.len());
    for serial in serials {
        let number = model_number(serial)?;
        let out = model_path(path, number);
        write_model(&pdb, serial, &out)?;
        models.push((number, out));
    }
    if models.len() != 1 {
        debug!(pdb_id = %pdb_id, models = models.len(), "split structure into model files");
    }
    Ok(SplitStructure { pdb_id, models })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_copy(name: &str) -> (tempfile::TempDir, PathBuf) {
        let src = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name);
        let dir = tempfile::tempdir().expect("tempdir");
        let dst = dir.path().join(name);
        std::fs::copy(&src, &dst).expect("copy fixture");
        (dir, dst)
    }

    fn atom_lines(path: &Path) -> usize {
        std::fs::read_to_string(path)
            .expect("read model")
            .lines()
            .filter(|line| line.starts_with("ATOM"))
            .count()
    }

    #[test]
    fn single_model_yields_one_file_and_header_id() {
        let (_dir, path) = fixture_copy("single_model.pdb");
        let split = split_models(&path).expect("split");
        assert_eq!(split.pdb_id, "1ABC");
        assert_eq!(split.models.len(), 1);
        let (number, model) = &split.models[0];
        assert_eq!(*number, 1);
        assert_eq!(model, &model_path(&path, 1));
        assert_eq!(atom_lines(model), 8);
    }

    #[test]
    fn multi_model_files_are_split_in_order() {
        let (_dir, path) = fixture_copy("multi_model.pdb");
        let split = split_models(&path).expect("split");
        assert_eq!(split.pdb_id, UNKNOWN_PDB_ID);
        let numbers: Vec<u32> = split.models.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        for (_, model) in &split.models {
            assert_eq!(atom_lines(model), 8);
        }
        assert!(path
            .to_string_lossy()
            .ends_with("multi_model.pdb"));
        assert!(split.models[2]
            .1
            .to_string_lossy()
            .ends_with("multi_model.pdb-model-3.pdb"));
    }

    #[test]
    fn structure_without_atoms_is_a_validation_error() {
        let (_dir, path) = fixture_copy("no_atoms.pdb");
        let err = split_models(&path).expect_err("no models");
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn unreadable_input_is_internal() {
        let err = split_models(Path::new("/nonexistent/1abc.pdb")).expect_err("missing");
        assert!(err.is_internal());
    }
}
