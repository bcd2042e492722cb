use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::filter::{normalize_key, Filter};
use crate::models::Example;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestMeta {
    /// `name` from the manifest, else the file stem.
    pub id: String,
    pub path: PathBuf,
    pub declared_harness_version: Option<String>,
    pub base_dir: PathBuf,
}

/// Read-only view of a validated manifest: examples in manifest order plus
/// CWE and tag multimaps holding positions into that order.
#[derive(Debug, Clone)]
pub struct CorpusIndex {
    meta: ManifestMeta,
    examples: Vec<Arc<Example>>,
    by_cwe: BTreeMap<String, Vec<usize>>,
    by_tag: BTreeMap<String, Vec<usize>>,
}

impl CorpusIndex {
    pub fn new(meta: ManifestMeta, examples: Vec<Arc<Example>>) -> Self {
        let mut by_cwe: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut by_tag: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (pos, example) in examples.iter().enumerate() {
            by_cwe.entry(normalize_key(&example.cwe)).or_default().push(pos);
            for tag in &example.tags {
                let slot = by_tag.entry(normalize_key(tag)).or_default();
                if slot.last() != Some(&pos) {
                    slot.push(pos);
                }
            }
        }
        Self { meta, examples, by_cwe, by_tag }
    }

    pub fn meta(&self) -> &ManifestMeta {
        &self.meta
    }

    pub fn examples(&self) -> &[Arc<Example>] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// CWE tags present, in sorted order.
    pub fn cwes(&self) -> impl Iterator<Item = &str> {
        self.by_cwe.keys().map(String::as_str)
    }

    pub fn by_cwe(&self, cwe: &str) -> Vec<Arc<Example>> {
        self.lookup(&self.by_cwe, cwe)
    }

    pub fn by_tag(&self, tag: &str) -> Vec<Arc<Example>> {
        self.lookup(&self.by_tag, tag)
    }

    fn lookup(&self, map: &BTreeMap<String, Vec<usize>>, key: &str) -> Vec<Arc<Example>> {
        map.get(&normalize_key(key))
            .map(|positions| positions.iter().map(|&p| self.examples[p].clone()).collect())
            .unwrap_or_default()
    }

    /// Examples matching the filter, in manifest order.
    pub fn select(&self, filter: &Filter) -> Vec<Arc<Example>> {
        if filter.is_empty() {
            return self.examples.clone();
        }
        let mut hit = vec![false; self.examples.len()];
        for cwe in &filter.cwes {
            for &pos in self.by_cwe.get(cwe).into_iter().flatten() {
                hit[pos] = true;
            }
        }
        for tag in &filter.tags {
            for &pos in self.by_tag.get(tag).into_iter().flatten() {
                hit[pos] = true;
            }
        }
        self.examples
            .iter()
            .zip(hit)
            .filter(|(_, selected)| *selected)
            .map(|(example, _)| example.clone())
            .collect()
    }

    /// A new index holding only the selected examples. Applying the same filter twice is a no-op.
    pub fn restrict(&self, filter: &Filter) -> CorpusIndex {
        CorpusIndex::new(self.meta.clone(), self.select(filter))
    }
}
