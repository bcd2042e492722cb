use data_encoding::BASE64;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::{ManifestError, ManifestErrorKind, ManifestErrors};
use super::schema::schema_warnings;
use super::security::{check_relative_path, find_absolute, find_traversal};
use super::template::unresolved_variables;
use super::types::{RawExample, RawManifest};
use crate::index::{CorpusIndex, ManifestMeta};
use crate::models::{BuildRecipe, Example, Intent, RunRecipe};
use crate::oracle::parse_oracle;

pub const MANIFEST_SIZE_LIMIT: u64 = 4 * 1024 * 1024;

/// Major manifest format version this harness understands.
pub const MANIFEST_FORMAT_MAJOR: &str = "1";

/// Load and validate a manifest, collecting every error rather than stopping at the first.
pub async fn load_manifest(path: &Path) -> Result<CorpusIndex, ManifestErrors> {
    let fail = |message: String| {
        ManifestErrors::single(ManifestError::new(
            ManifestErrorKind::SyntaxError,
            path.to_path_buf(),
            None,
            message,
        ))
    };

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| fail(format!("cannot read manifest: {}", e)))?;
    if !metadata.is_file() {
        return Err(fail("manifest is not a regular file".into()));
    }
    if metadata.len() > MANIFEST_SIZE_LIMIT {
        return Err(fail(format!(
            "manifest exceeds {} byte limit",
            MANIFEST_SIZE_LIMIT
        )));
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| fail(format!("cannot read manifest: {}", e)))?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let base_dir = tokio::fs::canonicalize(&parent)
        .await
        .map_err(|e| fail(format!("cannot resolve manifest directory: {}", e)))?;

    parse_manifest(&content, path, &base_dir).await
}

/// Validate manifest text whose relative paths resolve against `base_dir` (canonical).
pub async fn parse_manifest(
    content: &str,
    path: &Path,
    base_dir: &Path,
) -> Result<CorpusIndex, ManifestErrors> {
    let syntax = |e: serde_yaml::Error| {
        ManifestErrors::single(ManifestError::new(
            ManifestErrorKind::SyntaxError,
            path.to_path_buf(),
            e.location().map(|l| l.line()),
            e.to_string(),
        ))
    };

    let document: serde_yaml::Value = serde_yaml::from_str(content).map_err(syntax)?;
    let warnings = schema_warnings(&document);
    debug!(count = warnings.len(), "Manifest schema check finished");

    let raw: RawManifest = serde_yaml::from_str(content).map_err(syntax)?;

    let mut validator = Validator::new(path, base_dir, content);
    let declared_version = validator.harness_version(&raw);

    let mut examples = Vec::with_capacity(raw.examples.len());
    for (index, entry) in raw.examples.iter().enumerate() {
        if let Some(example) = validator.example(index, entry).await {
            examples.push(Arc::new(example));
        }
    }

    if !validator.errors.is_empty() {
        warn!(
            manifest = %path.display(),
            errors = validator.errors.len(),
            "Manifest validation failed"
        );
        return Err(ManifestErrors(validator.errors));
    }
    if examples.is_empty() {
        warn!(manifest = %path.display(), "Manifest lists no examples");
    }

    let id = raw
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "manifest".into())
        });

    let meta = ManifestMeta {
        id,
        path: path.to_path_buf(),
        declared_harness_version: declared_version,
        base_dir: base_dir.to_path_buf(),
    };
    info!(manifest = %meta.id, examples = examples.len(), "Manifest loaded");
    Ok(CorpusIndex::new(meta, examples))
}

static ID_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:-\s+)?id\s*:\s*(.*?)\s*$").expect("id line pattern is valid")
});

/// Best-effort map from example id to the manifest line declaring it.
struct IdLocator {
    entries: Vec<(String, usize)>,
}

impl IdLocator {
    fn new(content: &str) -> Self {
        let entries = content
            .lines()
            .enumerate()
            .filter_map(|(n, line)| {
                ID_LINE
                    .captures(line)
                    .map(|caps| (unquote(strip_comment(&caps[1])), n + 1))
            })
            .collect();
        Self { entries }
    }

    fn line_of(&self, id: &str, occurrence: usize) -> Option<usize> {
        self.entries
            .iter()
            .filter(|(value, _)| value == id)
            .nth(occurrence)
            .map(|(_, line)| *line)
    }
}

fn strip_comment(value: &str) -> &str {
    match value.find(" #") {
        Some(pos) if !value.starts_with('"') && !value.starts_with('\'') => value[..pos].trim_end(),
        _ => value,
    }
}

fn unquote(value: &str) -> String {
    let v = value.trim();
    for quote in ['"', '\''] {
        if v.len() >= 2 && v.starts_with(quote) && v.ends_with(quote) {
            return v[1..v.len() - 1].to_string();
        }
    }
    v.to_string()
}

struct Validator<'a> {
    path: &'a Path,
    base_dir: &'a Path,
    locator: IdLocator,
    /// Line (if known) of each id's first definition.
    seen: HashMap<String, Option<usize>>,
    occurrences: HashMap<String, usize>,
    errors: Vec<ManifestError>,
}

impl<'a> Validator<'a> {
    fn new(path: &'a Path, base_dir: &'a Path, content: &str) -> Self {
        Self {
            path,
            base_dir,
            locator: IdLocator::new(content),
            seen: HashMap::new(),
            occurrences: HashMap::new(),
            errors: Vec::new(),
        }
    }

    fn push(&mut self, kind: ManifestErrorKind, line: Option<usize>, message: impl Into<String>) {
        self.errors
            .push(ManifestError::new(kind, self.path.to_path_buf(), line, message));
    }

    fn harness_version(&mut self, raw: &RawManifest) -> Option<String> {
        let declared = match &raw.harness_version {
            None => {
                warn!("Manifest declares no harness-version");
                return None;
            }
            Some(serde_yaml::Value::String(s)) => s.trim().to_string(),
            Some(serde_yaml::Value::Number(n)) => n.to_string(),
            Some(_) => {
                self.push(
                    ManifestErrorKind::SyntaxError,
                    None,
                    "harness-version must be a string or number",
                );
                return None;
            }
        };
        let major = declared.split('.').next().unwrap_or_default().trim();
        if major != MANIFEST_FORMAT_MAJOR {
            warn!(
                declared = %declared,
                supported = MANIFEST_FORMAT_MAJOR,
                "Manifest harness-version major differs from this harness"
            );
        }
        Some(declared)
    }

    async fn example(&mut self, index: usize, raw: &RawExample) -> Option<Example> {
        use ManifestErrorKind::*;

        let before = self.errors.len();
        let id = raw.id.trim().to_string();
        let occurrence = self.occurrences.entry(id.clone()).or_insert(0);
        let line = self.locator.line_of(&id, *occurrence);
        *occurrence += 1;
        let label = if id.is_empty() { format!("#{}", index + 1) } else { format!("`{}`", id) };

        if id.is_empty() {
            self.push(SyntaxError, line, format!("example #{} has an empty id", index + 1));
        } else if let Some(first) = self.seen.get(&id).copied() {
            let at = first.map(|l| format!(" (first defined on line {})", l)).unwrap_or_default();
            self.push(DuplicateId, line, format!("duplicate id `{}`{}", id, at));
        } else {
            self.seen.insert(id.clone(), line);
        }

        let cwe = raw.cwe.trim().to_string();
        if cwe.is_empty() {
            self.push(EmptyTag, line, format!("example {} has an empty cwe tag", label));
        }
        let mut tags = Vec::with_capacity(raw.tags.len());
        for tag in &raw.tags {
            if tag.trim().is_empty() {
                self.push(EmptyTag, line, format!("example {} has an empty tag", label));
            } else {
                tags.push(tag.trim().to_string());
            }
        }

        let intent = Intent::parse(&raw.intent);
        if intent.is_none() {
            let expected: Vec<&str> = Intent::ALL.iter().map(|i| i.as_str()).collect();
            self.push(
                UnknownIntent,
                line,
                format!(
                    "example {} has unknown intent `{}` (expected one of: {})",
                    label,
                    raw.intent,
                    expected.join(", ")
                ),
            );
        }

        let source = self.source(&label, raw.source.as_deref(), line).await;
        let example_dir = source
            .as_ref()
            .and_then(|(_, canonical)| canonical.parent().map(Path::to_path_buf));

        let build = match &raw.build {
            None => {
                self.push(BadRecipe, line, format!("example {} has no build recipe", label));
                None
            }
            Some(build) => {
                self.check_template(&label, "build command", build.command(), true, line);
                if build.command().trim().is_empty() {
                    self.push(BadRecipe, line, format!("example {} has an empty build command", label));
                }
                let mut inputs = Vec::new();
                for input in build.inputs() {
                    if let Some(rel) = self.input(&label, input, example_dir.as_deref(), line).await {
                        inputs.push(rel);
                    }
                }
                Some(BuildRecipe { command: build.command().to_string(), inputs })
            }
        };

        let artifact = match raw.build.as_ref().and_then(|b| b.artifact()) {
            Some(declared) => match check_relative_path(declared) {
                Ok(_) => Some(declared.trim().to_string()),
                Err(msg) => {
                    self.push(BadRecipe, line, format!("example {} artifact: {}", label, msg));
                    None
                }
            },
            None => source.as_ref().and_then(|(rel, _)| {
                rel.file_stem().map(|s| s.to_string_lossy().into_owned())
            }),
        };

        let argv = raw
            .run
            .as_ref()
            .map(|r| r.argv())
            .unwrap_or_else(|| vec!["{artifact}".to_string()]);
        if argv.is_empty() {
            self.push(BadRecipe, line, format!("example {} has an empty run command", label));
        }
        for (i, arg) in argv.iter().enumerate() {
            self.check_template(&label, "run command", arg, i == 0, line);
        }

        let stdin = match &raw.stdin {
            None => Vec::new(),
            Some(encoded) => {
                let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
                match BASE64.decode(compact.as_bytes()) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        self.push(BadRecipe, line, format!("example {} stdin is not valid base64: {}", label, e));
                        Vec::new()
                    }
                }
            }
        };

        for key in raw.env.keys() {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                self.push(BadRecipe, line, format!("example {} has invalid env name `{}`", label, key));
            }
        }

        let wall_cap = match raw.timeout {
            Some(0) => {
                self.push(BadRecipe, line, format!("example {} timeout must be at least 1 second", label));
                None
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let oracle = match parse_oracle(&raw.oracle) {
            Ok(oracle) => Some(oracle),
            Err(e) => {
                self.push(BadOracle, line, format!("example {} oracle: {}", label, e));
                None
            }
        };

        if self.errors.len() > before {
            return None;
        }
        let (Some(intent), Some((source, canonical)), Some(example_dir), Some(build), Some(artifact), Some(oracle)) =
            (intent, source, example_dir, build, artifact, oracle)
        else {
            return None;
        };
        let source_name = canonical
            .strip_prefix(&example_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| canonical.clone());

        Some(Example {
            id,
            cwe,
            intent,
            source,
            example_dir,
            source_name,
            artifact,
            build,
            run: RunRecipe { argv, stdin, env: raw.env.clone() },
            oracle,
            tags,
            wall_cap,
            line,
        })
    }

    /// Returns the relative path as written and its canonical location.
    async fn source(
        &mut self,
        label: &str,
        raw: Option<&str>,
        line: Option<usize>,
    ) -> Option<(PathBuf, PathBuf)> {
        let Some(raw) = raw else {
            self.push(ManifestErrorKind::MissingSource, line, format!("example {} has no source", label));
            return None;
        };
        let rel = match check_relative_path(raw) {
            Ok(rel) => rel,
            Err(msg) => {
                self.push(ManifestErrorKind::BadRecipe, line, format!("example {} source: {}", label, msg));
                return None;
            }
        };
        let canonical = self
            .existing_file_within(&self.base_dir.join(&rel), self.base_dir)
            .await;
        match canonical {
            Ok(path) => Some((rel, path)),
            Err(why) => {
                self.push(
                    ManifestErrorKind::MissingSource,
                    line,
                    format!("example {} source `{}` {}", label, raw.trim(), why),
                );
                None
            }
        }
    }

    async fn input(
        &mut self,
        label: &str,
        raw: &str,
        example_dir: Option<&Path>,
        line: Option<usize>,
    ) -> Option<PathBuf> {
        let rel = match check_relative_path(raw) {
            Ok(rel) => rel,
            Err(msg) => {
                self.push(ManifestErrorKind::BadRecipe, line, format!("example {} build input: {}", label, msg));
                return None;
            }
        };
        // Without a resolved source there is no directory to check against.
        let dir = example_dir?;
        match self.existing_file_within(&dir.join(&rel), dir).await {
            Ok(_) => Some(rel),
            Err(why) => {
                self.push(
                    ManifestErrorKind::MissingSource,
                    line,
                    format!("example {} build input `{}` {}", label, raw.trim(), why),
                );
                None
            }
        }
    }

    async fn existing_file_within(&self, candidate: &Path, root: &Path) -> Result<PathBuf, &'static str> {
        let canonical = tokio::fs::canonicalize(candidate)
            .await
            .map_err(|_| "does not exist")?;
        if !canonical.starts_with(root) {
            return Err("resolves outside the example directory");
        }
        match tokio::fs::metadata(&canonical).await {
            Ok(m) if m.is_file() => Ok(canonical),
            Ok(_) => Err("is not a regular file"),
            Err(_) => Err("does not exist"),
        }
    }

    fn check_template(
        &mut self,
        label: &str,
        what: &str,
        template: &str,
        leading_program: bool,
        line: Option<usize>,
    ) {
        for name in unresolved_variables(template) {
            self.push(
                ManifestErrorKind::BadRecipe,
                line,
                format!("example {} {} uses unknown template variable `{{{}}}`", label, what, name),
            );
        }
        if let Some(word) = find_traversal(template) {
            self.push(
                ManifestErrorKind::BadRecipe,
                line,
                format!("example {} {} references `{}` outside the example directory", label, what, word),
            );
        }
        if let Some(word) = find_absolute(template, leading_program) {
            self.push(
                ManifestErrorKind::BadRecipe,
                line,
                format!("example {} {} references absolute path `{}`", label, what, word),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestErrorKind::*;
    use tempfile::TempDir;

    struct Corpus {
        dir: TempDir,
    }

    impl Corpus {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join("ex")).unwrap();
            std::fs::write(dir.path().join("ex/main.sh"), "#!/bin/sh\nexit 0\n").unwrap();
            std::fs::write(dir.path().join("ex/data.txt"), "payload").unwrap();
            Self { dir }
        }

        async fn load(&self, manifest: &str) -> Result<CorpusIndex, ManifestErrors> {
            let path = self.dir.path().join("corpus.yaml");
            std::fs::write(&path, manifest).unwrap();
            load_manifest(&path).await
        }
    }

    const ENTRY: &str = r#"
  - id: ok
    cwe: CWE-121
    intent: intended-vulnerable
    source: ex/main.sh
    build: "cp {source} {artifact} && chmod +x {artifact}"
    oracle: "exit-status: zero"
"#;

    fn manifest(entries: &str) -> String {
        format!("harness-version: \"1\"\nexamples:{}", entries)
    }

    #[tokio::test]
    async fn test_valid_manifest_loads() {
        let corpus = Corpus::new();
        let index = corpus.load(&manifest(ENTRY)).await.unwrap();
        assert_eq!(index.len(), 1);
        let ex = &index.examples()[0];
        assert_eq!(ex.id, "ok");
        assert_eq!(ex.artifact, "main");
        assert_eq!(ex.source_name, PathBuf::from("main.sh"));
        assert_eq!(ex.run.argv, vec!["{artifact}"]);
        assert_eq!(ex.line, Some(3));
        assert_eq!(index.meta().id, "corpus");
        assert_eq!(index.meta().declared_harness_version.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_full_entry() {
        let corpus = Corpus::new();
        let index = corpus
            .load(&manifest(
                r#"
  - id: full
    cwe: CWE-787
    intent: illustrative
    source: ex/main.sh
    tags: [memory, heap]
    build: {command: "cp {source} demo", inputs: [data.txt], artifact: demo}
    run: "{artifact} --size 4"
    stdin: QUJD
    env: {MALLOC_CHECK_: "3"}
    timeout: 3
    oracle:
      any-of:
        - "exit-status: in-set {1, 2}"
        - stderr-contains: overflow
"#,
            ))
            .await
            .unwrap();
        let ex = &index.examples()[0];
        assert_eq!(ex.intent, Intent::Illustrative);
        assert_eq!(ex.artifact, "demo");
        assert_eq!(ex.build.inputs, vec![PathBuf::from("data.txt")]);
        assert_eq!(ex.run.argv, vec!["{artifact}", "--size", "4"]);
        assert_eq!(ex.run.stdin, b"ABC");
        assert_eq!(ex.run.env.get("MALLOC_CHECK_").map(String::as_str), Some("3"));
        assert_eq!(ex.wall_cap, Some(Duration::from_secs(3)));
        assert!(ex.has_tag("HEAP"));
    }

    #[tokio::test]
    async fn test_missing_source() {
        let corpus = Corpus::new();
        let errors = corpus
            .load(&manifest(&ENTRY.replace("ex/main.sh", "ex/nope.c")))
            .await
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.0[0].kind, MissingSource);
        assert_eq!(errors.0[0].line, Some(3));
    }

    #[tokio::test]
    async fn test_duplicate_id_reports_second_line() {
        let corpus = Corpus::new();
        let errors = corpus.load(&manifest(&format!("{}{}", ENTRY, ENTRY))).await.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.0[0].kind, DuplicateId);
        assert_eq!(errors.0[0].line, Some(10));
        assert!(errors.0[0].message.contains("line 3"));
    }

    #[tokio::test]
    async fn test_errors_are_collected() {
        let corpus = Corpus::new();
        let entry = ENTRY
            .replace("CWE-121", "\"\"")
            .replace("intended-vulnerable", "vulnerable-ish")
            .replace("exit-status: zero", "exit-status: sometimes")
            .replace("{source} {artifact}", "{source} {output}");
        let errors = corpus.load(&manifest(&entry)).await.unwrap_err();
        for kind in [EmptyTag, UnknownIntent, BadOracle, BadRecipe] {
            assert!(errors.has_kind(kind), "missing {} in {}", kind, errors);
        }
    }

    #[tokio::test]
    async fn test_path_escapes_rejected() {
        let corpus = Corpus::new();
        let errors = corpus
            .load(&manifest(&ENTRY.replace("ex/main.sh", "../outside.c")))
            .await
            .unwrap_err();
        assert!(errors.has_kind(BadRecipe));

        let errors = corpus
            .load(&manifest(&ENTRY.replace("cp {source}", "cp ../../etc/passwd")))
            .await
            .unwrap_err();
        assert!(errors.has_kind(BadRecipe));
    }

    #[tokio::test]
    async fn test_absolute_recipe_paths_rejected() {
        let corpus = Corpus::new();
        let errors = corpus
            .load(&manifest(&ENTRY.replace("cp {source} {artifact}", "cp {source} /tmp/x")))
            .await
            .unwrap_err();
        assert!(errors.has_kind(BadRecipe));
        assert!(errors.to_string().contains("/tmp/x"), "{}", errors);

        let entry = format!("{}    run: [\"{{artifact}}\", \"/etc/passwd\"]\n", ENTRY);
        let errors = corpus.load(&manifest(&entry)).await.unwrap_err();
        assert!(errors.has_kind(BadRecipe));

        let entry = format!("{}    run: [\"/bin/sh\", \"{{artifact}}\"]\n", ENTRY);
        assert!(corpus.load(&manifest(&entry)).await.is_ok());
    }

    #[tokio::test]
    async fn test_bad_stdin_and_timeout() {
        let corpus = Corpus::new();
        let entry = format!("{}    stdin: \"!!notbase64\"\n    timeout: 0\n", ENTRY);
        let errors = corpus.load(&manifest(&entry)).await.unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind == BadRecipe));
    }

    #[tokio::test]
    async fn test_empty_id_is_syntax_error() {
        let corpus = Corpus::new();
        let errors = corpus.load(&manifest(&ENTRY.replace("id: ok", "id: \"\""))).await.unwrap_err();
        assert!(errors.has_kind(SyntaxError));
    }

    #[tokio::test]
    async fn test_yaml_syntax_error_has_line() {
        let corpus = Corpus::new();
        let errors = corpus.load("examples:\n  - id: [unclosed\n").await.unwrap_err();
        assert_eq!(errors.0[0].kind, SyntaxError);
        assert!(errors.0[0].line.is_some());
    }

    #[tokio::test]
    async fn test_unknown_key_is_syntax_error() {
        let corpus = Corpus::new();
        let errors = corpus
            .load(&manifest(&format!("{}    colour: red\n", ENTRY)))
            .await
            .unwrap_err();
        assert_eq!(errors.0[0].kind, SyntaxError);
    }

    #[tokio::test]
    async fn test_missing_manifest_file() {
        let errors = load_manifest(Path::new("/nonexistent/corpus.yaml")).await.unwrap_err();
        assert_eq!(errors.0[0].kind, SyntaxError);
    }

    #[tokio::test]
    async fn test_version_mismatch_is_only_a_warning() {
        let corpus = Corpus::new();
        let text = manifest(ENTRY).replace("harness-version: \"1\"", "harness-version: 2.1");
        let index = corpus.load(&text).await.unwrap();
        assert_eq!(index.meta().declared_harness_version.as_deref(), Some("2.1"));
    }

    #[test]
    fn test_id_locator() {
        let locator = IdLocator::new("examples:\n  - id: a\n  - id: \"b\"  \n  - id: a # again\n");
        assert_eq!(locator.line_of("a", 0), Some(2));
        assert_eq!(locator.line_of("b", 0), Some(3));
        assert_eq!(locator.line_of("a", 1), Some(4));
        assert_eq!(locator.line_of("c", 0), None);
    }
}
