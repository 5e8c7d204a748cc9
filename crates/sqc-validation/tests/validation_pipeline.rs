// SPDX-License-Identifier: Apache-2.0

use sqc_core::ToolCommand;
use sqc_model::{DataVersion, MolProbityVersions, ResidueId, UNKNOWN_PDB_ID};
use sqc_validation::{MolProbity, StaticProvenance, Validator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn cat_fixture(name: &str) -> ToolCommand {
    let script = format!("cat '{}'", fixture(name).display());
    ToolCommand::new("sh").with_args(["-c".to_string(), script, "tool".to_string()])
}

fn versions() -> MolProbityVersions {
    let version = |name: &str| DataVersion {
        url: format!("https://github.com/rlabduke/{name}.git"),
        commit_sha: format!("{name}-head"),
    };
    MolProbityVersions {
        geostd_version: version("geostd"),
        mon_lib_version: version("mon_lib"),
        rotarama_version: version("rotarama_data"),
        cablam_version: version("cablam_data"),
        rama_z_version: version("rama_z"),
    }
}

fn validator(residue_tool: ToolCommand, clash_tool: ToolCommand) -> Validator {
    Validator::new(
        MolProbity {
            residue_tool,
            clash_tool,
            timeout: Duration::from_millis(700),
        },
        Arc::new(StaticProvenance(versions())),
    )
}

fn copy_into(dir: &Path, name: &str) -> PathBuf {
    let dst = dir.join(name);
    std::fs::copy(fixture(name), &dst).expect("copy fixture");
    dst
}

#[test]
fn single_model_bond_length_outlier_end_to_end() {
    let work = tempfile::tempdir().expect("work");
    let input = copy_into(work.path(), "single_model.pdb");

    let result = validator(
        cat_fixture("residue_analysis.csv"),
        cat_fixture("clashscore.txt"),
    )
    .validate(&input)
    .expect("validate");

    assert_eq!(result.pdb_id, "1ABC");
    assert!(result.status.residue_analysis);
    assert!(result.status.clash_analysis);
    assert_eq!(result.status.molprobity_versions, versions());
    assert_eq!(result.models.len(), 1);

    let model = &result.models[0];
    assert_eq!(model.number, 1);
    let residues = model.residues.as_ref().expect("residues");
    assert_eq!(residues.len(), 1);
    assert_eq!(residues[0].id, ResidueId::new('A', 9, "LYS"));
    assert_eq!(residues[0].bond_length_outlier_count, Some(1));
    let worst = residues[0].worst_bond_length.as_ref().expect("worst length");
    assert_eq!(worst.length, 1.612);
    assert_eq!(worst.sigma, 4.4);

    let clashes = model.clashes.as_ref().expect("clashes");
    assert_eq!(clashes.len(), 1);
    assert_eq!(clashes[0].first_atom.atom, "HA");
    assert_eq!(clashes[0].second_atom.residue_number, 10);
    assert_eq!(clashes[0].magnitude, 0.512);

    let json = result.to_json_vec().expect("encode");
    assert_eq!(
        sqc_model::ValidationResult::from_json_slice(&json).expect("decode"),
        result
    );
}

#[test]
fn clash_timeout_keeps_residues_and_clears_clash_flag() {
    let work = tempfile::tempdir().expect("work");
    let input = copy_into(work.path(), "single_model.pdb");
    let slow_clashscore = ToolCommand::new("sh").with_args(["-c", "sleep 5", "tool"]);

    let result = validator(cat_fixture("residue_analysis.csv"), slow_clashscore)
        .validate(&input)
        .expect("timeouts are not fatal");

    assert!(result.status.residue_analysis);
    assert!(!result.status.clash_analysis);
    let model = &result.models[0];
    assert_eq!(model.residues.as_ref().map(Vec::len), Some(1));
    assert!(model.clashes.is_none());

    let value = serde_json::to_value(&result).expect("encode");
    assert!(value["models"][0].get("clashes").is_none());
}

#[test]
fn every_model_is_analysed_in_order() {
    let work = tempfile::tempdir().expect("work");
    let input = copy_into(work.path(), "multi_model.pdb");
    let log = work.path().join("analysed.txt");
    let record = ToolCommand::new("sh").with_args([
        "-c".to_string(),
        format!("echo \"$1\" >> '{}'; echo residue", log.display()),
        "tool".to_string(),
    ]);

    let result = validator(record, cat_fixture("clashscore.txt"))
        .validate(&input)
        .expect("validate");

    assert_eq!(result.pdb_id, UNKNOWN_PDB_ID);
    let numbers: Vec<u32> = result.models.iter().map(|m| m.number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert!(result
        .models
        .iter()
        .all(|m| m.residues.as_deref() == Some(&[][..])));

    let analysed = std::fs::read_to_string(&log).expect("log");
    let analysed: Vec<&str> = analysed.lines().collect();
    assert_eq!(analysed.len(), 3);
    assert!(analysed[0].ends_with("multi_model.pdb-model-1.pdb"));
    assert!(analysed[2].ends_with("multi_model.pdb-model-3.pdb"));
}

#[test]
fn broken_analysis_output_fails_the_job() {
    let work = tempfile::tempdir().expect("work");
    let input = copy_into(work.path(), "single_model.pdb");
    let garbage =
        ToolCommand::new("sh").with_args(["-c", "echo residue; echo 'A nine LYS'", "tool"]);

    let err = validator(garbage, cat_fixture("clashscore.txt"))
        .validate(&input)
        .expect_err("unparsable");
    assert_eq!(err.code(), "validation_error");
}
