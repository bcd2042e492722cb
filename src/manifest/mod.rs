pub mod error;
pub mod parser;
pub mod schema;
pub mod security;
pub mod template;
pub mod types;

pub use error::{ManifestError, ManifestErrorKind, ManifestErrors};
pub use parser::{load_manifest, parse_manifest};
pub use template::{resolve_template, TemplateContext, TEMPLATE_VARIABLES};
