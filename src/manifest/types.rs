use serde::Deserialize;
use std::collections::BTreeMap;

/// Manifest document as written, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawManifest {
    /// String or number; only the major component is compared.
    #[serde(default)]
    pub harness_version: Option<serde_yaml::Value>,
    pub name: Option<String>,
    #[serde(default)]
    pub examples: Vec<RawExample>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawExample {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub cwe: String,
    #[serde(default)]
    pub intent: String,
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub build: Option<RawBuild>,
    pub run: Option<RawRun>,
    /// Base64.
    pub stdin: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Per-example wall cap in seconds.
    pub timeout: Option<u64>,
    #[serde(default)]
    pub oracle: serde_yaml::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawBuild {
    Command(String),
    Detailed(RawBuildSpec),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBuildSpec {
    pub command: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub artifact: Option<String>,
}

impl RawBuild {
    pub fn command(&self) -> &str {
        match self {
            Self::Command(c) => c,
            Self::Detailed(spec) => &spec.command,
        }
    }

    pub fn inputs(&self) -> &[String] {
        match self {
            Self::Command(_) => &[],
            Self::Detailed(spec) => &spec.inputs,
        }
    }

    pub fn artifact(&self) -> Option<&str> {
        match self {
            Self::Command(_) => None,
            Self::Detailed(spec) => spec.artifact.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawRun {
    Argv(Vec<String>),
    Line(String),
}

impl RawRun {
    pub fn argv(&self) -> Vec<String> {
        match self {
            Self::Argv(argv) => argv.clone(),
            Self::Line(line) => line.split_whitespace().map(String::from).collect(),
        }
    }
}
