use super::{document_source, load_options, print_success};
use crate::cli::GlobalOptions;
use crate::loader::load_document;
use crate::{OapitError, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Load the document and validate its structure.
pub fn execute_validate_schema(options: &GlobalOptions, cancel: &CancellationToken) -> Result<()> {
    if options.no_validate_schema {
        return Err(OapitError::Configuration(
            "`validate schema` cannot be combined with --no-validate-schema".to_string(),
        ));
    }

    let source = document_source(options)?;
    let document = load_document(&source, &load_options(options), cancel)?;

    let info = |field: &str| {
        document
            .root
            .pointer(&format!("/info/{}", field))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    print_success(
        options.output,
        &[
            ("OpenAPI", document.openapi_version().unwrap_or_default().to_string()),
            ("Title", info("title")),
            ("Version", info("version")),
            ("Schemas", document.components.len().to_string()),
            ("Operations", document.operations.len().to_string()),
        ],
    );
    Ok(())
}
