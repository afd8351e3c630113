use super::{document_source, load_options, print_success};
use crate::cli::GlobalOptions;
use crate::loader::{Source, load_document, read_payload};
use crate::validation::{PayloadOptions, ValidationMode, validate_payload};
use crate::{OapitError, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Validate a JSON payload against the schema component `schema`.
pub fn execute_validate_payload(
    options: &GlobalOptions,
    schema: &str,
    mode: &str,
    payload: &Path,
    validate_formats: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    // Reject a bad mode before touching any input
    let mode: ValidationMode = mode.parse()?;

    let document_source = document_source(options)?;
    let payload_source = Source::from_arg(payload);
    if document_source.is_stdin() && payload_source.is_stdin() {
        return Err(OapitError::Configuration(
            "the document and the payload cannot both be read from standard input".to_string(),
        ));
    }

    let document = load_document(&document_source, &load_options(options), cancel)?;
    // Fail on an unknown component before reading the payload
    document.require_schema(schema)?;
    let value = read_payload(&payload_source)?;

    validate_payload(
        &document,
        schema,
        &value,
        &PayloadOptions {
            mode,
            validate_formats,
        },
        cancel,
    )?;

    print_success(
        options.output,
        &[
            ("Schema", schema.to_string()),
            ("Mode", mode.to_string()),
        ],
    );
    Ok(())
}
