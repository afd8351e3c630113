use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "oapit")]
#[command(version)]
#[command(about = "Validate OpenAPI 3.0 documents and JSON payloads", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub options: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalOptions {
    /// OpenAPI document to load ("-" reads standard input)
    #[arg(short = 'f', long, global = true, env = "OAPIT_SCHEMA_FILE")]
    pub schema_file: Option<String>,

    /// Skip structural validation of the document
    #[arg(long, global = true)]
    pub no_validate_schema: bool,

    /// Do not follow references into other files or URLs
    #[arg(long, global = true)]
    pub no_resolve_reference: bool,

    /// Keys tolerated next to $ref (comma-separated, repeatable)
    #[arg(long, global = true, value_delimiter = ',')]
    pub allow_extra_sibling_fields: Vec<String>,

    /// Do not check examples against their schemas
    #[arg(long, global = true)]
    pub no_validate_examples: bool,

    /// Do not check defaults against their schemas
    #[arg(long, global = true)]
    pub no_validate_defaults: bool,

    /// Do not check that patterns compile
    #[arg(long, global = true)]
    pub no_validate_patterns: bool,

    /// Report format
    #[arg(long, global = true, env = "OAPIT_OUTPUT", default_value = "text")]
    pub output: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate an OpenAPI document or a payload
    Validate {
        #[command(subcommand)]
        target: ValidateTarget,
    },
}

#[derive(Subcommand)]
pub enum ValidateTarget {
    /// Validate the OpenAPI document itself
    Schema,

    /// Validate a JSON payload against a schema component
    Payload {
        /// Name of the schema under components/schemas
        #[arg(short, long)]
        schema: String,

        /// Treat the payload as a request or a response body
        #[arg(long = "as", default_value = "request")]
        mode: String,

        /// Skip format checks (date, uuid, email, ...)
        #[arg(long)]
        no_validate_formats: bool,

        /// JSON payload file ("-" reads standard input)
        payload: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Text,
    /// JSON report
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload_command() {
        let cli = Cli::try_parse_from([
            "oapit",
            "-f",
            "openapi.yaml",
            "--allow-extra-sibling-fields",
            "description,summary",
            "--allow-extra-sibling-fields",
            "x-order",
            "validate",
            "payload",
            "-s",
            "Pet",
            "--as",
            "response",
            "pet.json",
        ])
        .unwrap();

        assert_eq!(cli.options.schema_file.as_deref(), Some("openapi.yaml"));
        assert_eq!(
            cli.options.allow_extra_sibling_fields,
            vec!["description", "summary", "x-order"]
        );
        let Commands::Validate {
            target: ValidateTarget::Payload { schema, mode, payload, .. },
        } = cli.command
        else {
            panic!("expected payload command");
        };
        assert_eq!(schema, "Pet");
        assert_eq!(mode, "response");
        assert_eq!(payload, "pet.json");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "oapit",
            "validate",
            "schema",
            "--schema-file",
            "-",
            "--no-validate-examples",
            "--output",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.options.schema_file.as_deref(), Some("-"));
        assert!(cli.options.no_validate_examples);
        assert_eq!(cli.options.output, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::Validate { target: ValidateTarget::Schema }
        ));
    }
}
