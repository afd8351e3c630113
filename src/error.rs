use crate::cancellation::Phase;
use crate::validation::MultiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OapitError {
    #[error("Failed to parse OpenAPI document {source_name}: {message}")]
    DocumentParse {
        source_name: String,
        message: String,
    },

    #[error("Failed to resolve reference {pointer}: {reason}")]
    Reference { pointer: String, reason: String },

    #[error("Document validation failed: {0}")]
    DocumentValidation(MultiError),

    #[error("Schema component not found: {0}")]
    SchemaNotFound(String),

    #[error("Failed to decode JSON payload {source_name}: {message}")]
    PayloadParse {
        source_name: String,
        message: String,
    },

    #[error("Payload validation failed: {0}")]
    PayloadValidation(MultiError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Interrupted during {0}")]
    Cancelled(Phase),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OapitError {
    pub fn document_parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DocumentParse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn reference(pointer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Reference {
            pointer: pointer.into(),
            reason: reason.into(),
        }
    }

    pub fn payload_parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PayloadParse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Process exit status for this error.
    ///
    /// `1` separates "validation failed" from `2`, "could not load input".
    pub fn exit_code(&self) -> i32 {
        match self {
            OapitError::DocumentValidation(_) | OapitError::PayloadValidation(_) => 1,
            OapitError::Cancelled(_) => 130,
            _ => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, OapitError>;
