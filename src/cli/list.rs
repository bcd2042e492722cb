use console::style;

use crate::cli::commands::ListArgs;
use crate::config::HarnessConfig;
use crate::errors::HarnessError;
use crate::index::{CorpusIndex, Filter};
use crate::pipeline::validate_manifest;

pub async fn handle_list(args: ListArgs) -> Result<i32, HarnessError> {
    let config = HarnessConfig::new(&args.manifest);
    let index = validate_manifest(&config).await?;
    let filter = Filter::new(args.filter_cwe, args.filter_tag);
    print!("{}", render_listing(&index.restrict(&filter)));
    Ok(0)
}

/// CWE headings, each followed by its example ids in manifest order.
pub fn render_listing(index: &CorpusIndex) -> String {
    let mut out = String::new();
    for cwe in index.cwes() {
        let examples = index.by_cwe(cwe);
        out.push_str(&format!("{} ({})\n", style(cwe).bold(), examples.len()));
        for example in examples {
            let tags = if example.tags.is_empty() {
                String::new()
            } else {
                format!("  [{}]", example.tags.join(", "))
            };
            out.push_str(&format!("  {}  {}{}\n", example.id, style(example.intent).dim(), tags));
        }
    }
    out.push_str(&format!("{} examples\n", index.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ManifestMeta;
    use crate::models::{Example, Intent};
    use crate::oracle::{parse_clause, Oracle};
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn test_listing_groups_by_cwe() {
        console::set_colors_enabled(false);
        let oracle = || Oracle::Single(parse_clause("exit-status: zero").unwrap());
        let mut a = Example::fixture("a", Intent::IntendedVulnerable, oracle());
        a.tags = vec!["memory".into()];
        let b = Example::fixture("b", Intent::IntendedMitigated, oracle());
        let mut c = Example::fixture("c", Intent::Illustrative, oracle());
        c.cwe = "CWE-190".into();
        let meta = ManifestMeta {
            id: "t".into(),
            path: PathBuf::from("t.yaml"),
            declared_harness_version: None,
            base_dir: PathBuf::from("/"),
        };
        let index = CorpusIndex::new(meta, vec![Arc::new(a), Arc::new(b), Arc::new(c)]);

        let text = render_listing(&index);
        assert!(text.contains("CWE-121 (2)\n  a  intended-vulnerable  [memory]\n  b  intended-mitigated\n"));
        assert!(text.contains("CWE-190 (1)\n  c  illustrative\n"));
        assert!(text.ends_with("3 examples\n"));
    }
}
