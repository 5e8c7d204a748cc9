// SPDX-License-Identifier: Apache-2.0

use sqc_core::{JobError, JobResult};
use sqc_model::{DataVersion, MolProbityVersions};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const DEFAULT_REFERENCE_DATA_ROOT: &str = "/molprobity/modules/chem_data";

/// Reference dataset checkouts under the data root, in
/// [`MolProbityVersions`] field order.
pub const REFERENCE_DATASETS: [&str; 5] = [
    "geostd",
    "mon_lib",
    "rotarama_data",
    "cablam_data",
    "rama_z",
];

/// Reports which reference data the analysis tools run against.
pub trait ProvenanceSource: Send + Sync {
    fn versions(&self) -> JobResult<MolProbityVersions>;
}

/// Reads `origin` and `HEAD` of each dataset checkout with `git`.
#[derive(Debug, Clone)]
pub struct GitProvenance {
    root: PathBuf,
    git: String,
}

impl GitProvenance {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            git: "git".to_string(),
        }
    }

    #[must_use]
    pub fn with_git_program(mut self, program: impl Into<String>) -> Self {
        self.git = program.into();
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn git_stdout(&self, repo: &Path, args: &[&str]) -> JobResult<String> {
        let repo_display = repo.display().to_string();
        let output = Command::new(&self.git)
            .args(["-C", repo_display.as_str()])
            .args(args)
            .output()
            .map_err(|e| JobError::internal(format!("run {} in {repo_display}: {e}", self.git)))?;
        if !output.status.success() {
            return Err(JobError::internal(format!(
                "git {} in {repo_display} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() {
            return Err(JobError::internal(format!(
                "git {} in {repo_display} printed nothing",
                args.join(" ")
            )));
        }
        Ok(value)
    }

    fn dataset_version(&self, dataset: &str) -> JobResult<DataVersion> {
        let repo = self.root.join(dataset);
        Ok(DataVersion {
            url: self.git_stdout(&repo, &["remote", "get-url", "origin"])?,
            commit_sha: self.git_stdout(&repo, &["rev-parse", "HEAD"])?,
        })
    }
}

impl Default for GitProvenance {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_DATA_ROOT)
    }
}

impl ProvenanceSource for GitProvenance {
    fn versions(&self) -> JobResult<MolProbityVersions> {
        let [geostd, mon_lib, rotarama, cablam, rama_z] = REFERENCE_DATASETS;
        Ok(MolProbityVersions {
            geostd_version: self.dataset_version(geostd)?,
            mon_lib_version: self.dataset_version(mon_lib)?,
            rotarama_version: self.dataset_version(rotarama)?,
            cablam_version: self.dataset_version(cablam)?,
            rama_z_version: self.dataset_version(rama_z)?,
        })
    }
}

/// Fixed versions, for deployments without dataset checkouts and for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticProvenance(pub MolProbityVersions);

impl ProvenanceSource for StaticProvenance {
    fn versions(&self) -> JobResult<MolProbityVersions> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args([
                "-c",
                "user.name=sqc",
                "-c",
                "user.email=sqc@localhost",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .status()
            .expect("git runs");
        assert!(status.success(), "git {args:?} failed");
    }

    fn checkout(root: &Path, name: &str) -> String {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).expect("mkdir");
        git(&dir, &["init", "-q"]);
        git(
            &dir,
            &[
                "remote",
                "add",
                "origin",
                &format!("https://github.com/rlabduke/{name}.git"),
            ],
        );
        git(&dir, &["commit", "-q", "--allow-empty", "-m", "data"]);
        let out = Command::new("git")
            .arg("-C")
            .arg(&dir)
            .args(["rev-parse", "HEAD"])
            .output()
            .expect("rev-parse");
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    #[test]
    fn reads_remote_and_head_of_every_dataset() {
        let root = tempfile::tempdir().expect("tempdir");
        let heads: Vec<String> = REFERENCE_DATASETS
            .iter()
            .map(|name| checkout(root.path(), name))
            .collect();

        let versions = GitProvenance::new(root.path()).versions().expect("versions");
        assert_eq!(
            versions.geostd_version.url,
            "https://github.com/rlabduke/geostd.git"
        );
        assert_eq!(versions.geostd_version.commit_sha, heads[0]);
        assert_eq!(
            versions.rotarama_version.url,
            "https://github.com/rlabduke/rotarama_data.git"
        );
        assert_eq!(versions.rama_z_version.commit_sha, heads[4]);
    }

    #[test]
    fn missing_checkout_is_internal() {
        let root = tempfile::tempdir().expect("tempdir");
        checkout(root.path(), "geostd");
        let err = GitProvenance::new(root.path())
            .versions()
            .expect_err("mon_lib is missing");
        assert!(err.is_internal());
    }

    #[test]
    fn missing_git_binary_is_internal() {
        let err = GitProvenance::default()
            .with_git_program("/nonexistent/git")
            .versions()
            .expect_err("no git");
        assert!(err.is_internal());
    }
}
