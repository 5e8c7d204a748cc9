// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use sqc_core::ToolCommand;
use sqc_model::{DataVersion, FileType, MolProbityVersions};
use sqc_store::{
    ConverterOutput, FormatConverter, GatewayConfig, LocalFsStore, RequestGateway, RetryPolicy,
};
use sqc_validation::{MolProbity, StaticProvenance, Validator};
use sqc_worker::{AckMode, JobRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn fixture_bytes(name: &str) -> Vec<u8> {
    std::fs::read(fixture(name)).expect("read fixture")
}

fn cat_fixture(name: &str) -> ToolCommand {
    let script = format!("cat '{}'", fixture(name).display());
    ToolCommand::new("sh").with_args(["-c".to_string(), script, "tool".to_string()])
}

pub fn versions() -> MolProbityVersions {
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

/// Copies `{input}` to `{output}`; stands in for a real mmCIF converter.
pub fn copying_converter() -> FormatConverter {
    FormatConverter {
        command: ToolCommand::new("sh").with_args([
            "-c",
            "cp \"$1\" \"$2\"",
            "convert",
            "{input}",
            "{output}",
        ]),
        timeout: Duration::from_secs(5),
        output: ConverterOutput::File,
    }
}

/// A local store plus the job pipeline wired against canned analysis output.
pub struct Harness {
    _root: tempfile::TempDir,
    pub gateway: Arc<RequestGateway>,
    pub jobs: Arc<JobRunner>,
}

impl Harness {
    pub fn new(ack_mode: AckMode) -> Self {
        let root = tempfile::tempdir().expect("store root");
        let store = Arc::new(LocalFsStore::new(root.path().to_path_buf()));
        let gateway = RequestGateway::new(
            store,
            GatewayConfig {
                retry: RetryPolicy {
                    max_attempts: 1,
                    base_backoff_ms: 0,
                },
                converter: copying_converter(),
                ..GatewayConfig::default()
            },
        )
        .expect("gateway");
        let validator = Validator::new(
            MolProbity {
                residue_tool: cat_fixture("residue_analysis.csv"),
                clash_tool: cat_fixture("clashscore.txt"),
                timeout: Duration::from_secs(5),
            },
            Arc::new(StaticProvenance(versions())),
        );
        let gateway = Arc::new(gateway);
        let jobs = Arc::new(JobRunner::new(
            Arc::clone(&gateway),
            Arc::new(validator),
            ack_mode,
            None,
        ));
        Self {
            _root: root,
            gateway,
            jobs,
        }
    }

    pub fn submit_pdb(&self, id: &str) {
        self.gateway
            .submit_request(id, &fixture_bytes("single_model.pdb"), FileType::Pdb)
            .expect("submit");
    }

    pub fn has_response(&self, id: &str) -> bool {
        self.gateway.fetch_response(id).is_ok()
    }
}

/// Polls `done` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}
