pub mod validate_payload;
pub mod validate_schema;

pub use validate_payload::execute_validate_payload;
pub use validate_schema::execute_validate_schema;

use crate::cli::{Cli, Commands, GlobalOptions, OutputFormat, ValidateTarget};
use crate::loader::{LoadOptions, Source};
use crate::validation::ValidationConfig;
use crate::{OapitError, Result};
use colored::*;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Run the parsed command line to completion.
pub fn execute(cli: &Cli, cancel: &CancellationToken) -> Result<()> {
    match &cli.command {
        Commands::Validate { target } => match target {
            ValidateTarget::Schema => execute_validate_schema(&cli.options, cancel),
            ValidateTarget::Payload {
                schema,
                mode,
                no_validate_formats,
                payload,
            } => execute_validate_payload(
                &cli.options,
                schema,
                mode,
                Path::new(payload),
                !no_validate_formats,
                cancel,
            ),
        },
    }
}

/// Where the OpenAPI document is read from.
pub(crate) fn document_source(options: &GlobalOptions) -> Result<Source> {
    options
        .schema_file
        .as_deref()
        .map(|file| Source::from_arg(Path::new(file)))
        .ok_or_else(|| {
            OapitError::Configuration(
                "no OpenAPI document given: pass --schema-file or set OAPIT_SCHEMA_FILE"
                    .to_string(),
            )
        })
}

pub(crate) fn load_options(options: &GlobalOptions) -> LoadOptions {
    LoadOptions {
        validate_schema: !options.no_validate_schema,
        resolve_external_refs: !options.no_resolve_reference,
        validation: ValidationConfig::default()
            .with_allowed_siblings(options.allow_extra_sibling_fields.iter().cloned())
            .with_examples(!options.no_validate_examples)
            .with_defaults(!options.no_validate_defaults)
            .with_patterns(!options.no_validate_patterns),
    }
}

fn print_success(output: OutputFormat, details: &[(&str, String)]) {
    match output {
        OutputFormat::Text => {
            println!("{}", "✓ No validation errors".green());
            for (label, value) in details {
                println!("  {}: {}", label, value);
            }
        }
        OutputFormat::Json => {
            let mut report = serde_json::Map::new();
            report.insert("valid".to_string(), true.into());
            for (label, value) in details {
                report.insert(label.to_lowercase(), value.clone().into());
            }
            println!("{}", serde_json::Value::Object(report));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_load_options_from_flags() {
        let cli = Cli::try_parse_from([
            "oapit",
            "-f",
            "openapi.yaml",
            "--no-resolve-reference",
            "--no-validate-defaults",
            "--allow-extra-sibling-fields",
            "description",
            "validate",
            "schema",
        ])
        .unwrap();

        let options = load_options(&cli.options);
        assert!(options.validate_schema);
        assert!(!options.resolve_external_refs);
        assert!(!options.validation.validate_defaults);
        assert!(options.validation.validate_examples);
        assert!(options.validation.allow_extra_sibling_fields.contains("description"));
    }

    #[test]
    fn test_missing_document_is_configuration_error() {
        let cli = Cli::try_parse_from(["oapit", "validate", "schema"]).unwrap();
        if cli.options.schema_file.is_some() {
            // OAPIT_SCHEMA_FILE is set in this environment
            return;
        }
        let err = document_source(&cli.options).unwrap_err();
        assert!(matches!(err, OapitError::Configuration(_)));
    }

    fn run(args: &[&str]) -> Result<()> {
        let cli = Cli::try_parse_from(args).unwrap();
        execute(&cli, &CancellationToken::new())
    }

    #[test]
    fn test_unknown_mode_rejected_before_loading() {
        let err = run(&[
            "oapit",
            "-f",
            "/nonexistent/openapi.yaml",
            "validate",
            "payload",
            "-s",
            "Pet",
            "--as",
            "bogus",
            "/nonexistent/pet.json",
        ])
        .unwrap_err();
        assert!(matches!(err, OapitError::Configuration(ref msg) if msg.contains("bogus")));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_document_and_payload_both_on_stdin() {
        let err = run(&["oapit", "-f", "-", "validate", "payload", "-s", "Pet", "-"]).unwrap_err();
        assert!(matches!(err, OapitError::Configuration(ref msg) if msg.contains("standard input")));
    }

    #[test]
    fn test_validate_schema_with_validation_disabled() {
        let err = run(&[
            "oapit",
            "-f",
            "/nonexistent/openapi.yaml",
            "--no-validate-schema",
            "validate",
            "schema",
        ])
        .unwrap_err();
        assert!(matches!(err, OapitError::Configuration(ref msg) if msg.contains("--no-validate-schema")));
        assert_eq!(err.exit_code(), 2);
    }
}
