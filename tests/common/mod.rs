#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use cwe_harness::config::{HarnessConfig, OutputTarget};

pub const BUILD: &str = "cp {source} {artifact} && chmod +x {artifact}";

/// A throwaway corpus directory plus a separate scratch root and output dir.
pub struct Corpus {
    pub dir: TempDir,
    pub scratch: TempDir,
    pub out: TempDir,
}

impl Corpus {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            scratch: TempDir::new().unwrap(),
            out: TempDir::new().unwrap(),
        }
    }

    pub fn script(&self, rel: &str, body: &str) {
        let path = self.dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    }

    pub fn manifest(&self, examples: &str) -> PathBuf {
        let path = self.dir.path().join("harness.yaml");
        std::fs::write(&path, format!("harness-version: \"1\"\nname: test-corpus\nexamples:\n{}", examples)).unwrap();
        path
    }

    pub fn report_path(&self) -> PathBuf {
        self.out.path().join("report.json")
    }

    pub fn config(&self, manifest: &Path) -> HarnessConfig {
        let mut config = HarnessConfig::new(manifest);
        config.scratch_root = self.scratch.path().to_path_buf();
        config.env_whitelist = vec!["PATH".into()];
        config.caps.wall = Duration::from_secs(20);
        config.parallelism = 2;
        config.output = OutputTarget::File(self.report_path());
        config
    }

    pub fn report_json(&self) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(self.report_path()).unwrap()).unwrap()
    }

    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.path()).unwrap().count()
    }
}

/// One manifest entry in YAML, indented under `examples:`.
pub fn entry(id: &str, intent: &str, source: &str, oracle: &str) -> String {
    format!(
        "  - id: {id}\n    cwe: CWE-121\n    intent: {intent}\n    source: {source}\n    build: \"{BUILD}\"\n    oracle: {oracle}\n"
    )
}
