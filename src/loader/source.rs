use crate::error::{OapitError, Result};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use url::Url;

/// Where a document or payload is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Stdin,
    File(PathBuf),
}

impl Source {
    /// `-` selects standard input, anything else is a file path.
    pub fn from_arg(path: &Path) -> Self {
        if path.as_os_str() == "-" {
            Source::Stdin
        } else {
            Source::File(path.to_path_buf())
        }
    }

    pub fn is_stdin(&self) -> bool {
        matches!(self, Source::Stdin)
    }

    /// Read the whole source as UTF-8 text.
    pub fn read_to_string(&self) -> std::io::Result<String> {
        match self {
            Source::Stdin => {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                Ok(buf)
            }
            Source::File(path) => fs::read_to_string(path),
        }
    }

    /// URL against which relative references of this source resolve.
    ///
    /// Standard input resolves relative to the working directory.
    pub fn base_url(&self) -> Result<Url> {
        let invalid = |e: std::io::Error| OapitError::document_parse(self.to_string(), e.to_string());
        match self {
            Source::Stdin => {
                let cwd = std::env::current_dir().map_err(invalid)?;
                Url::from_directory_path(&cwd).map_err(|_| {
                    OapitError::document_parse(
                        self.to_string(),
                        format!("working directory {} is not a valid base", cwd.display()),
                    )
                })
            }
            Source::File(path) => {
                let absolute = std::path::absolute(path).map_err(invalid)?;
                Url::from_file_path(&absolute).map_err(|_| {
                    OapitError::document_parse(
                        self.to_string(),
                        format!("{} is not a valid file location", absolute.display()),
                    )
                })
            }
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Stdin => write!(f, "-"),
            Source::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Load and decode an OpenAPI document (JSON or YAML).
pub fn read_document(source: &Source) -> Result<Value> {
    let content = source.read_to_string().map_err(|e| {
        OapitError::document_parse(source.to_string(), format!("Failed to read: {}", e))
    })?;
    parse_document(&content).map_err(|message| OapitError::document_parse(source.to_string(), message))
}

/// Load and decode a JSON payload.
pub fn read_payload(source: &Source) -> Result<Value> {
    let content = source.read_to_string().map_err(|e| {
        OapitError::payload_parse(source.to_string(), format!("Failed to read: {}", e))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| OapitError::payload_parse(source.to_string(), e.to_string()))
}

/// Decode document text. JSON is tried first when the text looks like an
/// object, YAML otherwise or when that fails (flow-style YAML also starts with
/// `{`). The root must be a mapping.
pub fn parse_document(content: &str) -> std::result::Result<Value, String> {
    let json = content
        .trim_start()
        .starts_with('{')
        .then(|| serde_json::from_str::<Value>(content));

    let value = match json {
        Some(Ok(value)) => value,
        _ => {
            let yaml: serde_yaml::Value = serde_yaml::from_str(content)
                .map_err(|e| format!("Failed to parse YAML: {}", e))?;
            yaml_to_json(yaml)?
        }
    };

    if !value.is_object() {
        return Err("document root must be a mapping".to_string());
    }
    Ok(value)
}

/// Convert YAML into JSON, stringifying scalar mapping keys such as `200:`.
fn yaml_to_json(value: serde_yaml::Value) -> std::result::Result<Value, String> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("unsupported number {}", n))?
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<std::result::Result<_, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut object = serde_json::Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    _ => return Err("mapping keys must be scalars".to_string()),
                };
                object.insert(key, yaml_to_json(value)?);
            }
            Value::Object(object)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

/// Fetch the text of an external document.
pub fn fetch_external(url: &Url) -> std::result::Result<String, String> {
    match url.scheme() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| format!("invalid file URL {}", url))?;
            fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read file {}: {}", path.display(), e))
        }
        "http" | "https" => {
            tracing::debug!(%url, "fetching remote document");
            let client = reqwest::blocking::Client::builder()
                .timeout(None)
                .build()
                .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
            client
                .get(url.clone())
                .send()
                .and_then(|response| response.error_for_status())
                .and_then(|response| response.text())
                .map_err(|e| format!("Failed to fetch {}: {}", url, e))
        }
        other => Err(format!("unsupported URL scheme {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_dash_selects_stdin() {
        assert_eq!(Source::from_arg(Path::new("-")), Source::Stdin);
        assert_eq!(
            Source::from_arg(Path::new("api.yaml")),
            Source::File(PathBuf::from("api.yaml"))
        );
    }

    #[test]
    fn test_parse_yaml_with_numeric_keys() {
        let yaml = r#"
openapi: 3.0.3
paths:
  /pets:
    get:
      responses:
        200:
          description: OK
"#;
        let doc = parse_document(yaml).unwrap();
        assert!(doc["paths"]["/pets"]["get"]["responses"]["200"].is_object());
        assert_eq!(doc["openapi"], "3.0.3");
    }

    #[test]
    fn test_parse_json_document() {
        let doc = parse_document(r#"{"openapi": "3.0.0", "info": {"title": "x"}}"#).unwrap();
        assert_eq!(doc["info"]["title"], "x");
    }

    #[test]
    fn test_parse_flow_style_yaml_document() {
        let doc = parse_document("{openapi: 3.0.3, info: {title: t, version: v}, paths: {}}").unwrap();
        assert_eq!(doc["openapi"], "3.0.3");
        assert_eq!(doc["info"]["version"], "v");
        assert!(doc["paths"].as_object().is_some_and(|paths| paths.is_empty()));
    }

    #[test]
    fn test_parse_rejects_non_mapping_root() {
        assert!(parse_document("- a\n- b\n").is_err());
        assert!(parse_document("openapi: [unclosed").is_err());
    }

    #[test]
    fn test_read_payload_reports_source() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{\"id\": ").unwrap();

        let source = Source::File(file.path().to_path_buf());
        let err = read_payload(&source).unwrap_err();
        assert!(matches!(err, OapitError::PayloadParse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_read_document_missing_file() {
        let source = Source::File(PathBuf::from("/nonexistent/openapi.yaml"));
        let err = read_document(&source).unwrap_err();
        assert!(matches!(err, OapitError::DocumentParse { .. }));
    }

    #[test]
    fn test_fetch_rejects_unknown_scheme() {
        let url = Url::parse("ftp://example.com/openapi.yaml").unwrap();
        assert!(fetch_external(&url).is_err());
    }
}
