use super::resolver::resolve_document;
use super::source::{Source, read_document};
use crate::cancellation::{Phase, checkpoint};
use crate::error::Result;
use crate::models::Document;
use crate::validation::{ValidationConfig, validate_document};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// How a document is loaded.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Run structural validation after resolution
    pub validate_schema: bool,
    /// Follow references into other files and URLs
    pub resolve_external_refs: bool,
    pub validation: ValidationConfig,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            validate_schema: true,
            resolve_external_refs: true,
            validation: ValidationConfig::default(),
        }
    }
}

/// Load an OpenAPI document: parse, resolve references, and optionally
/// validate its structure.
pub fn load_document(
    source: &Source,
    options: &LoadOptions,
    cancel: &CancellationToken,
) -> Result<Document> {
    checkpoint(cancel, Phase::Loading)?;
    let root = read_document(source)?;
    let base = source.base_url()?;
    let document = resolve_document(root, base, options.resolve_external_refs, cancel)?;

    if options.validate_schema {
        checkpoint(cancel, Phase::DocumentValidation)?;
        validate_document(&document, &options.validation)?;
        tracing::info!(source = %source, "document is valid");
    } else {
        tracing::debug!(source = %source, "structural validation skipped");
    }

    Ok(document)
}

/// Load an OpenAPI document from a file with default options
pub fn load_openapi<P: AsRef<Path>>(path: P) -> Result<Document> {
    load_document(
        &Source::File(path.as_ref().to_path_buf()),
        &LoadOptions::default(),
        &CancellationToken::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OapitError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_openapi() {
        let file = write_temp(
            r#"
openapi: 3.0.0
info:
  title: Test API
  version: 1.0.0
paths:
  /test:
    get:
      operationId: getTest
      responses:
        '200':
          description: OK
components:
  schemas:
    Test:
      type: object
"#,
        );

        let doc = load_openapi(file.path()).unwrap();
        assert_eq!(doc.openapi_version(), Some("3.0.0"));
        assert!(doc.schema("Test").is_some());
        assert_eq!(doc.operations.len(), 1);
    }

    #[test]
    fn test_load_invalid_version() {
        let file = write_temp(
            r#"
openapi: 2.0.0
info:
  title: Test API
  version: 1.0.0
paths: {}
"#,
        );

        let err = load_openapi(file.path()).unwrap_err();
        assert!(matches!(err, OapitError::DocumentValidation(_)));
    }

    #[test]
    fn test_invalid_version_accepted_without_validation() {
        let file = write_temp(
            r#"
openapi: 2.0.0
info:
  title: Test API
  version: 1.0.0
paths: {}
"#,
        );

        let options = LoadOptions {
            validate_schema: false,
            ..LoadOptions::default()
        };
        let source = Source::File(file.path().to_path_buf());
        assert!(load_document(&source, &options, &CancellationToken::new()).is_ok());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let err = load_openapi("/nonexistent/file.yaml").unwrap_err();
        assert!(matches!(err, OapitError::DocumentParse { .. }));
    }

    #[test]
    fn test_cancelled_before_loading() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let source = Source::File("/nonexistent/file.yaml".into());
        let err = load_document(&source, &LoadOptions::default(), &cancel).unwrap_err();
        assert!(matches!(err, OapitError::Cancelled(Phase::Loading)));
    }
}
