use crate::error::OapitError;
use serde::Serialize;
use std::fmt;

/// A single rule violation, located by a slash-separated path.
///
/// Payload paths are relative to the payload root (`items/0/name`), document
/// paths are JSON pointers into the document (`components/schemas/Pet`).
/// Composition failures carry the per-branch violations as `causes`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<Violation>,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            causes: Vec::new(),
        }
    }

    pub fn with_causes(mut self, causes: Vec<Violation>) -> Self {
        self.causes = causes;
        self
    }

    /// Format violation with its location
    pub fn format(&self) -> String {
        format!("Error at \"/{}\": {}", self.path, self.message)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

/// Non-empty collection of violations from one validation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiError(Vec<Violation>);

impl MultiError {
    /// Returns `None` for an empty collection.
    pub fn from_violations(violations: Vec<Violation>) -> Option<Self> {
        if violations.is_empty() {
            None
        } else {
            Some(Self(violations))
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn first(&self) -> &Violation {
        &self.0[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    pub fn into_violations(self) -> Vec<Violation> {
        self.0
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            1 => write!(f, "1 error: {}", self.0[0]),
            n => write!(f, "{} errors", n),
        }
    }
}

impl<'a> IntoIterator for &'a MultiError {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One reportable line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    /// Absent for failures that are not tied to a location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// Uniform view over any failure: a single error or a violation collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub kind: &'static str,
    pub summary: String,
    pub entries: Vec<ReportEntry>,
    pub count: usize,
}

impl Report {
    pub fn from_error(error: &OapitError) -> Self {
        let (kind, entries) = match error {
            OapitError::DocumentValidation(errors) => ("document_validation", entries_of(errors)),
            OapitError::PayloadValidation(errors) => ("payload_validation", entries_of(errors)),
            OapitError::DocumentParse { .. } => ("document_parse", single(error)),
            OapitError::Reference { pointer, reason } => (
                "reference",
                vec![ReportEntry {
                    path: Some(pointer.trim_start_matches("#/").to_string()),
                    message: reason.clone(),
                    details: Vec::new(),
                }],
            ),
            OapitError::SchemaNotFound(_) => ("schema_not_found", single(error)),
            OapitError::PayloadParse { .. } => ("payload_parse", single(error)),
            OapitError::Configuration(_) => ("configuration", single(error)),
            OapitError::Cancelled(_) => ("cancelled", single(error)),
            OapitError::IoError(_) => ("io", single(error)),
        };

        let summary = match error {
            OapitError::DocumentValidation(errors) | OapitError::PayloadValidation(errors) => {
                match errors.len() {
                    1 => "validation error: 1 error".to_string(),
                    n => format!("validation errors: {} errors", n),
                }
            }
            other => other.to_string(),
        };

        Self {
            kind,
            summary,
            count: entries.len(),
            entries,
        }
    }

    /// Human-readable lines, one per entry, causes indented below their entry.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.count);
        for entry in &self.entries {
            match &entry.path {
                Some(path) => lines.push(format!("Error at \"/{}\": {}", path, entry.message)),
                None => lines.push(entry.message.clone()),
            }
            lines.extend(entry.details.iter().map(|d| format!("    {}", d)));
        }
        lines
    }
}

fn entries_of(errors: &MultiError) -> Vec<ReportEntry> {
    errors
        .iter()
        .map(|v| {
            let mut details = Vec::new();
            flatten_causes(&v.causes, 0, &mut details);
            ReportEntry {
                path: Some(v.path.clone()),
                message: v.message.clone(),
                details,
            }
        })
        .collect()
}

fn flatten_causes(causes: &[Violation], depth: usize, out: &mut Vec<String>) {
    for cause in causes {
        out.push(format!("{}{}", "  ".repeat(depth), cause.format()));
        flatten_causes(&cause.causes, depth + 1, out);
    }
}

fn single(error: &OapitError) -> Vec<ReportEntry> {
    vec![ReportEntry {
        path: None,
        message: error.to_string(),
        details: Vec::new(),
    }]
}
