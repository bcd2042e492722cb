use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestErrorKind {
    DuplicateId,
    MissingSource,
    BadOracle,
    BadRecipe,
    EmptyTag,
    UnknownIntent,
    SyntaxError,
}

impl ManifestErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateId => "duplicate-id",
            Self::MissingSource => "missing-source",
            Self::BadOracle => "bad-oracle",
            Self::BadRecipe => "bad-recipe",
            Self::EmptyTag => "empty-tag",
            Self::UnknownIntent => "unknown-intent",
            Self::SyntaxError => "syntax-error",
        }
    }
}

impl fmt::Display for ManifestErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validation failure, located as precisely as the loader could manage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestError {
    pub kind: ManifestErrorKind,
    pub path: PathBuf,
    /// 1-based.
    pub line: Option<usize>,
    pub message: String,
}

impl ManifestError {
    pub fn new(
        kind: ManifestErrorKind,
        path: PathBuf,
        line: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self { kind, path, line, message: message.into() }
    }
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}: {}", self.path.display(), line, self.kind, self.message),
            None => write!(f, "{}: {}: {}", self.path.display(), self.kind, self.message),
        }
    }
}

impl std::error::Error for ManifestError {}

/// Every failure found in one manifest. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestErrors(pub Vec<ManifestError>);

impl ManifestErrors {
    pub fn single(error: ManifestError) -> Self {
        Self(vec![error])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_kind(&self, kind: ManifestErrorKind) -> bool {
        self.0.iter().any(|e| e.kind == kind)
    }
}

impl fmt::Display for ManifestErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "manifest validation failed ({} error{})", self.0.len(), if self.0.len() == 1 { "" } else { "s" })?;
        for error in &self.0 {
            write!(f, "\n  {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ManifestErrors {}
