pub mod document;
pub mod format;
pub mod payload;
pub mod report;

pub use document::validate_document;
pub use payload::{PayloadOptions, PayloadValidator, validate_payload};
pub use report::{MultiError, Report, ReportEntry, Violation};

use crate::error::OapitError;
use std::collections::BTreeSet;
use std::str::FromStr;

/// Whether a payload is a request body or a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Request,
    Response,
}

impl std::fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationMode::Request => write!(f, "request"),
            ValidationMode::Response => write!(f, "response"),
        }
    }
}

impl FromStr for ValidationMode {
    type Err = OapitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(ValidationMode::Request),
            "response" => Ok(ValidationMode::Response),
            other => Err(OapitError::Configuration(format!(
                "unknown validation mode \"{}\": expected \"request\" or \"response\"",
                other
            ))),
        }
    }
}

/// Toggleable rule categories of document validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationConfig {
    /// Keys tolerated next to `$ref`
    pub allow_extra_sibling_fields: BTreeSet<String>,
    pub validate_examples: bool,
    pub validate_defaults: bool,
    pub validate_patterns: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            allow_extra_sibling_fields: BTreeSet::new(),
            validate_examples: true,
            validate_defaults: true,
            validate_patterns: true,
        }
    }
}

impl ValidationConfig {
    pub fn with_allowed_siblings<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_extra_sibling_fields
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_examples(mut self, enabled: bool) -> Self {
        self.validate_examples = enabled;
        self
    }

    pub fn with_defaults(mut self, enabled: bool) -> Self {
        self.validate_defaults = enabled;
        self
    }

    pub fn with_patterns(mut self, enabled: bool) -> Self {
        self.validate_patterns = enabled;
        self
    }
}
