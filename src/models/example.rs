use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use crate::oracle::Oracle;

/// The author's claim about what an example demonstrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    IntendedVulnerable,
    IntendedMitigated,
    Illustrative,
}

impl Intent {
    pub const ALL: [Intent; 3] = [
        Intent::IntendedVulnerable,
        Intent::IntendedMitigated,
        Intent::Illustrative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntendedVulnerable => "intended-vulnerable",
            Self::IntendedMitigated => "intended-mitigated",
            Self::Illustrative => "illustrative",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.as_str() == value.trim())
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shell command template run inside the scratch directory to produce the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecipe {
    pub command: String,
    /// Extra files, relative to the example directory, copied next to the source.
    pub inputs: Vec<PathBuf>,
}

/// How the built artifact is launched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunRecipe {
    /// argv template; element 0 is the program.
    pub argv: Vec<String>,
    pub stdin: Vec<u8>,
    pub env: BTreeMap<String, String>,
}

/// One validated corpus entry. Immutable once the manifest loader hands it to the index.
#[derive(Debug, Clone)]
pub struct Example {
    pub id: String,
    pub cwe: String,
    pub intent: Intent,
    /// Source path as written in the manifest (relative to the manifest directory).
    pub source: PathBuf,
    /// Absolute directory holding the source; every recipe input lives below it.
    pub example_dir: PathBuf,
    /// Source path relative to `example_dir`.
    pub source_name: PathBuf,
    pub artifact: String,
    pub build: BuildRecipe,
    pub run: RunRecipe,
    pub oracle: Oracle,
    pub tags: Vec<String>,
    /// Per-example wall cap override.
    pub wall_cap: Option<Duration>,
    /// 1-based line of the entry in the manifest, when it could be located.
    pub line: Option<usize>,
}

impl Example {
    pub fn source_path(&self) -> PathBuf {
        self.example_dir.join(&self.source_name)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[cfg(test)]
impl Example {
    /// Minimal valid example for unit tests elsewhere in the crate.
    pub(crate) fn fixture(id: &str, intent: Intent, oracle: Oracle) -> Self {
        Self {
            id: id.to_string(),
            cwe: "CWE-121".to_string(),
            intent,
            source: PathBuf::from(format!("{}/main.c", id)),
            example_dir: PathBuf::from(format!("/corpus/{}", id)),
            source_name: PathBuf::from("main.c"),
            artifact: "main".to_string(),
            build: BuildRecipe {
                command: "cc -o {artifact} {source}".to_string(),
                inputs: Vec::new(),
            },
            run: RunRecipe {
                argv: vec!["{artifact}".to_string()],
                ..Default::default()
            },
            oracle,
            tags: Vec::new(),
            wall_cap: None,
            line: None,
        }
    }
}
