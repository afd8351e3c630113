//! Structural validation of a resolved OpenAPI 3.0 document.

use super::payload::PayloadValidator;
use super::report::{MultiError, Violation};
use super::ValidationConfig;
use crate::error::{OapitError, Result};
use crate::loader::pointer;
use crate::models::{Document, OperationInfo, RefSite, SchemaId, SchemaKind, SchemaNode};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

const PARAMETER_LOCATIONS: [&str; 4] = ["query", "header", "path", "cookie"];

/// Check `document` against the OpenAPI 3.0 structural rules, reporting every
/// violation found.
pub fn validate_document(document: &Document, config: &ValidationConfig) -> Result<()> {
    let mut validator = DocumentValidator::new(document, config);
    validator.check_root();
    validator.check_operations();
    validator.check_detached_ref_sites();
    validator.check_schemas();

    tracing::debug!(
        violations = validator.violations.len(),
        schemas = validator.visited.len(),
        "document validation finished"
    );
    match MultiError::from_violations(validator.violations) {
        None => Ok(()),
        Some(errors) => Err(OapitError::DocumentValidation(errors)),
    }
}

struct DocumentValidator<'a> {
    document: &'a Document,
    config: &'a ValidationConfig,
    visited: HashSet<SchemaId>,
    /// `$ref` sites inside a schema, reported right after that schema
    owned_sites: HashMap<SchemaId, Vec<&'a RefSite>>,
    /// `$ref` sites standing as a traversal root, reported before the walk
    root_sites: HashMap<&'a str, Vec<&'a RefSite>>,
    /// `$ref` sites outside any schema walk
    detached_sites: Vec<&'a RefSite>,
    violations: Vec<Violation>,
}

impl<'a> DocumentValidator<'a> {
    fn new(document: &'a Document, config: &'a ValidationConfig) -> Self {
        let roots: HashSet<String> = document
            .components
            .keys()
            .map(|name| component_location(name))
            .chain(
                document
                    .usages
                    .iter()
                    .filter(|usage| usage.schema.is_some())
                    .map(|usage| usage_location(&usage.location)),
            )
            .collect();

        let mut owned_sites: HashMap<SchemaId, Vec<&'a RefSite>> = HashMap::new();
        let mut root_sites: HashMap<&'a str, Vec<&'a RefSite>> = HashMap::new();
        let mut detached_sites = Vec::new();
        for site in &document.ref_sites {
            match site.owner {
                Some(owner) => owned_sites.entry(owner).or_default().push(site),
                None if roots.contains(&site.location) => {
                    root_sites.entry(site.location.as_str()).or_default().push(site)
                }
                None => detached_sites.push(site),
            }
        }

        Self {
            document,
            config,
            visited: HashSet::new(),
            owned_sites,
            root_sites,
            detached_sites,
            violations: Vec::new(),
        }
    }

    fn report(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation::new(path, message));
    }

    fn check_root(&mut self) {
        let document = self.document;
        let root = &document.root;

        match root.get("openapi") {
            Some(Value::String(version)) if version.starts_with("3.0.") => {}
            Some(Value::String(version)) => self.report(
                "openapi",
                format!("unsupported OpenAPI version \"{}\": expected 3.0.x", version),
            ),
            _ => self.report("openapi", "value of openapi must be a non-empty string"),
        }

        match root.get("info").and_then(Value::as_object) {
            None => self.report("info", "value of info must be an object"),
            Some(info) => {
                for field in ["title", "version"] {
                    let present = info
                        .get(field)
                        .and_then(Value::as_str)
                        .is_some_and(|s| !s.is_empty());
                    if !present {
                        self.report(
                            format!("info/{}", field),
                            format!("value of {} must be a non-empty string", field),
                        );
                    }
                }
            }
        }

        match root.get("paths").and_then(Value::as_object) {
            None => self.report("paths", "value of paths must be an object"),
            Some(paths) => {
                for path in paths.keys().filter(|p| !p.starts_with('/')) {
                    self.report(
                        format!("paths/{}", pointer::escape(path)),
                        format!("path \"{}\" must begin with a slash", path),
                    );
                }
            }
        }
    }

    fn check_operations(&mut self) {
        let document = self.document;
        let mut operation_ids: HashMap<&str, &str> = HashMap::new();
        let mut checked_parameters = HashSet::new();

        for operation in &document.operations {
            if !operation.has_responses {
                self.report(
                    format!("{}/responses", operation.location),
                    "value of responses must be a non-empty object",
                );
            }

            if let Some(id) = operation.operation_id.as_deref() {
                if let Some(first) = operation_ids.get(id) {
                    let message = format!("operationId \"{}\" is already used by {}", id, first);
                    self.report(format!("{}/operationId", operation.location), message);
                } else {
                    operation_ids.insert(id, &operation.location);
                }
            }

            self.check_parameters(operation, &mut checked_parameters);
        }
    }

    fn check_parameters(&mut self, operation: &'a OperationInfo, checked: &mut HashSet<&'a str>) {
        for parameter in &operation.parameters {
            // Path-level parameters are shared by every operation of the path
            if !checked.insert(&parameter.location) {
                continue;
            }
            let loc = &parameter.location;

            let Some(name) = parameter.name.as_deref() else {
                self.report(format!("{}/name", loc), "parameter must have a name");
                continue;
            };

            match parameter.position.as_deref() {
                Some(position) if PARAMETER_LOCATIONS.contains(&position) => {
                    if position == "path" && !parameter.required {
                        self.report(
                            format!("{}/required", loc),
                            format!("path parameter \"{}\" must be required", name),
                        );
                    }
                }
                other => self.report(
                    format!("{}/in", loc),
                    format!(
                        "parameter \"{}\" has invalid location {:?}: expected one of {}",
                        name,
                        other.unwrap_or_default(),
                        PARAMETER_LOCATIONS.join(", ")
                    ),
                ),
            }
        }
    }

    /// Walk components in declaration order, then the schemas used by
    /// operations, checking each node once.
    fn check_schemas(&mut self) {
        let document = self.document;
        for (name, &id) in &document.components {
            self.check_root_sites(&component_location(name));
            self.visit(id);
        }

        for usage in &document.usages {
            if let Some(id) = usage.schema {
                self.check_root_sites(&usage_location(&usage.location));
                self.visit(id);
            }
            if !self.config.validate_examples {
                continue;
            }
            let Some(id) = usage.schema else {
                continue;
            };
            let validator = PayloadValidator::new(&document.arena).with_mode(usage.mode);
            for (location, example) in &usage.examples {
                let causes = validator.violations(example, id);
                if !causes.is_empty() {
                    self.violations
                        .push(Violation::new(location, "invalid example").with_causes(causes));
                }
            }
        }
    }

    fn visit(&mut self, id: SchemaId) {
        let document = self.document;
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if !self.visited.insert(id) {
                continue;
            }
            let node = document.node(id);
            self.check_node(id, node);

            // Reverse so children are checked in declaration order
            let mut children = node.children();
            children.reverse();
            stack.extend(children);
        }
    }

    fn check_node(&mut self, id: SchemaId, node: &SchemaNode) {
        let loc = node.location.as_str();

        match &node.kind {
            SchemaKind::Unsupported(name) => {
                self.report(format!("{}/type", loc), format!("unsupported 'type' value \"{}\"", name));
            }
            SchemaKind::Array(rules) if rules.items.is_none() => {
                self.report(loc, "schema of type array must have items");
            }
            _ => {}
        }

        if node.annotations.read_only && node.annotations.write_only {
            self.report(loc, "a property must not be both readOnly and writeOnly");
        }

        if let Some(values) = &node.annotations.enumeration
            && values.is_empty()
        {
            self.report(format!("{}/enum", loc), "enum must contain at least one value");
        }

        self.check_bounds(node);

        let document = self.document;
        let config = self.config;
        let arena = &document.arena;
        if config.validate_defaults
            && let Some(default) = &node.annotations.default
        {
            let causes = PayloadValidator::new(arena).violations(default, id);
            if !causes.is_empty() {
                self.violations.push(
                    Violation::new(format!("{}/default", loc), "invalid default").with_causes(causes),
                );
            }
        }

        if config.validate_examples
            && let Some(example) = &node.annotations.example
        {
            let causes = PayloadValidator::new(arena).violations(example, id);
            if !causes.is_empty() {
                self.violations.push(
                    Violation::new(format!("{}/example", loc), "invalid example").with_causes(causes),
                );
            }
        }

        if let Some(sites) = self.owned_sites.remove(&id) {
            for site in sites {
                self.check_ref_site(site);
            }
        }
    }

    /// Keyword pairs that contradict each other, and patterns that do not compile.
    fn check_bounds(&mut self, node: &SchemaNode) {
        let loc = node.location.as_str();
        let (string, number, array, object) = match &node.kind {
            SchemaKind::Untyped(rules) => (
                Some(&rules.string),
                Some(&rules.number),
                Some(&rules.array),
                Some(&rules.object),
            ),
            SchemaKind::String(rules) => (Some(rules), None, None, None),
            SchemaKind::Number(rules) | SchemaKind::Integer(rules) => (None, Some(rules), None, None),
            SchemaKind::Array(rules) => (None, None, Some(rules), None),
            SchemaKind::Object(rules) => (None, None, None, Some(rules)),
            SchemaKind::Boolean | SchemaKind::Unsupported(_) => (None, None, None, None),
        };

        if let Some(rules) = string {
            if let (Some(min), Some(max)) = (rules.min_length, rules.max_length)
                && min > max
            {
                self.report(loc, format!("minLength {} is greater than maxLength {}", min, max));
            }
            if self.config.validate_patterns
                && let Some(pattern) = &rules.pattern
                && let Err(e) = pattern.regex()
            {
                self.report(
                    format!("{}/pattern", loc),
                    format!("cannot compile pattern \"{}\": {}", pattern.source, e),
                );
            }
        }

        if let Some(rules) = number {
            if let (Some(min), Some(max)) = (rules.minimum, rules.maximum)
                && min > max
            {
                self.report(loc, format!("minimum {} is greater than maximum {}", min, max));
            }
            if let Some(divisor) = rules.multiple_of
                && divisor <= 0.0
            {
                self.report(
                    format!("{}/multipleOf", loc),
                    format!("multipleOf must be greater than zero, got {}", divisor),
                );
            }
        }

        if let Some(rules) = array
            && let (Some(min), Some(max)) = (rules.min_items, rules.max_items)
            && min > max
        {
            self.report(loc, format!("minItems {} is greater than maxItems {}", min, max));
        }

        if let Some(rules) = object
            && let (Some(min), Some(max)) = (rules.min_properties, rules.max_properties)
            && min > max
        {
            self.report(
                loc,
                format!("minProperties {} is greater than maxProperties {}", min, max),
            );
        }
    }

    fn check_root_sites(&mut self, location: &str) {
        if let Some(sites) = self.root_sites.remove(location) {
            for site in sites {
                self.check_ref_site(site);
            }
        }
    }

    fn check_detached_ref_sites(&mut self) {
        for site in std::mem::take(&mut self.detached_sites) {
            self.check_ref_site(site);
        }
    }

    fn check_ref_site(&mut self, site: &RefSite) {
        let allowed = &self.config.allow_extra_sibling_fields;
        let extra: Vec<&str> = site
            .siblings
            .iter()
            .filter(|key| !allowed.contains(*key))
            .map(String::as_str)
            .collect();
        if extra.is_empty() {
            return;
        }
        let message = format!(
            "extra sibling fields [{}] next to $ref \"{}\"",
            extra.join(", "),
            site.reference
        );
        self.report(site.location.clone(), message);
    }
}

fn component_location(name: &str) -> String {
    format!("components/schemas/{}", pointer::escape(name))
}

fn usage_location(media_type: &str) -> String {
    format!("{}/schema", media_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::resolve_document;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use url::Url;

    fn document(paths: Value, schemas: Value) -> Document {
        let root = json!({
            "openapi": "3.0.3",
            "info": {"title": "Test API", "version": "1.0.0"},
            "paths": paths,
            "components": {"schemas": schemas}
        });
        resolve_document(
            root,
            Url::parse("file:///specs/openapi.yaml").unwrap(),
            false,
            &CancellationToken::new(),
        )
        .unwrap()
    }

    fn violations(doc: &Document, config: &ValidationConfig) -> Vec<Violation> {
        match validate_document(doc, config) {
            Ok(()) => Vec::new(),
            Err(OapitError::DocumentValidation(errors)) => errors.into_violations(),
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_valid_document() {
        let doc = document(
            json!({"/pets/{id}": {"get": {
                "operationId": "getPet",
                "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}}],
                "responses": {"200": {"description": "OK"}}
            }}}),
            json!({"Pet": {"type": "object", "properties": {"name": {"type": "string", "example": "Rex"}}}}),
        );
        assert!(validate_document(&doc, &ValidationConfig::default()).is_ok());
    }

    #[test]
    fn test_document_level_rules() {
        let root = json!({"openapi": "3.1.0", "info": {"title": ""}, "paths": {"pets": {}}});
        let doc = resolve_document(
            root,
            Url::parse("file:///specs/openapi.yaml").unwrap(),
            false,
            &CancellationToken::new(),
        )
        .unwrap();

        let found = violations(&doc, &ValidationConfig::default());
        let paths: Vec<&str> = found.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["openapi", "info/title", "info/version", "paths/pets"]);
    }

    #[test]
    fn test_operation_rules() {
        let doc = document(
            json!({
                "/a/{id}": {"get": {
                    "operationId": "op",
                    "parameters": [
                        {"name": "id", "in": "path"},
                        {"name": "q", "in": "body"}
                    ],
                    "responses": {}
                }},
                "/b": {"get": {"operationId": "op", "responses": {"200": {"description": "OK"}}}}
            }),
            json!({}),
        );

        let found = violations(&doc, &ValidationConfig::default());
        let paths: Vec<&str> = found.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "paths/~1a~1{id}/get/responses",
                "paths/~1a~1{id}/get/parameters/0/required",
                "paths/~1a~1{id}/get/parameters/1/in",
                "paths/~1b/get/operationId",
            ]
        );
    }

    #[test]
    fn test_schema_rules() {
        let doc = document(
            json!({}),
            json!({
                "Odd": {"type": "tuple"},
                "List": {"type": "array"},
                "Both": {"type": "string", "readOnly": true, "writeOnly": true},
                "Range": {"type": "integer", "minimum": 10, "maximum": 1},
                "Step": {"type": "number", "multipleOf": 0},
                "Empty": {"type": "string", "enum": []}
            }),
        );

        let found = violations(&doc, &ValidationConfig::default());
        assert_eq!(found.len(), 6);
        assert_eq!(found[0].path, "components/schemas/Odd/type");
        assert_eq!(found[1].path, "components/schemas/List");
        assert_eq!(found[4].path, "components/schemas/Step/multipleOf");
    }

    #[test]
    fn test_shared_schema_checked_once() {
        let doc = document(
            json!({}),
            json!({
                "Bad": {"type": "string", "minLength": 5, "maxLength": 1},
                "A": {"$ref": "#/components/schemas/Bad"},
                "B": {"type": "object", "properties": {"x": {"$ref": "#/components/schemas/Bad"}}}
            }),
        );
        assert_eq!(violations(&doc, &ValidationConfig::default()).len(), 1);
    }

    #[test]
    fn test_default_toggle() {
        let doc = document(json!({}), json!({"Count": {"type": "integer", "default": "many"}}));

        let found = violations(&doc, &ValidationConfig::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "components/schemas/Count/default");

        let config = ValidationConfig::default().with_defaults(false);
        assert!(violations(&doc, &config).is_empty());
    }

    #[test]
    fn test_schema_example_toggle() {
        let doc = document(json!({}), json!({"Name": {"type": "string", "example": 42}}));

        assert_eq!(violations(&doc, &ValidationConfig::default()).len(), 1);
        let config = ValidationConfig::default().with_examples(false);
        assert!(violations(&doc, &config).is_empty());
    }

    #[test]
    fn test_media_type_example_toggle() {
        let doc = document(
            json!({"/pets": {"post": {
                "requestBody": {"content": {"application/json": {
                    "schema": {"type": "object", "required": ["name"]},
                    "examples": {"empty": {"value": {}}}
                }}},
                "responses": {"201": {"description": "Created"}}
            }}}),
            json!({}),
        );

        let found = violations(&doc, &ValidationConfig::default());
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].path,
            "paths/~1pets/post/requestBody/content/application~1json/examples/empty/value"
        );
        assert_eq!(found[0].causes.len(), 1);

        let config = ValidationConfig::default().with_examples(false);
        assert!(violations(&doc, &config).is_empty());
    }

    #[test]
    fn test_pattern_toggle() {
        let doc = document(json!({}), json!({"Code": {"type": "string", "pattern": "(unclosed"}}));

        let found = violations(&doc, &ValidationConfig::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "components/schemas/Code/pattern");

        let config = ValidationConfig::default().with_patterns(false);
        assert!(violations(&doc, &config).is_empty());
    }

    #[test]
    fn test_malformed_pattern_in_composition_skipped() {
        let doc = document(
            json!({}),
            json!({"Mixed": {"allOf": [{"type": "string"}, {"pattern": "[a-"}]}}),
        );
        let config = ValidationConfig::default().with_patterns(false);
        assert!(validate_document(&doc, &config).is_ok());

        // The payload validator still applies the pattern
        let id = doc.schema("Mixed").unwrap();
        let found = PayloadValidator::new(&doc.arena).violations(&json!("xyz"), id);
        assert_eq!(found.len(), 1);
        assert!(found[0].message.contains("not a valid regular expression"));
    }

    #[test]
    fn test_sibling_fields_toggle() {
        let doc = document(
            json!({}),
            json!({
                "Pet": {"type": "object"},
                "Owner": {"type": "object", "properties": {
                    "pet": {"$ref": "#/components/schemas/Pet", "description": "Owned pet"}
                }}
            }),
        );

        let found = violations(&doc, &ValidationConfig::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "components/schemas/Owner/properties/pet");
        assert!(found[0].message.contains("description"));

        let config = ValidationConfig::default().with_allowed_siblings(["description"]);
        assert!(violations(&doc, &config).is_empty());
    }

    #[test]
    fn test_sibling_fields_reported_with_owning_schema() {
        let doc = document(
            json!({}),
            json!({
                "A": {"type": "object", "properties": {
                    "x": {"$ref": "#/components/schemas/T", "description": "extra"}
                }},
                "T": {"type": "string", "default": "nope", "maxLength": 2}
            }),
        );

        let paths: Vec<String> = violations(&doc, &ValidationConfig::default())
            .into_iter()
            .map(|v| v.path)
            .collect();
        assert_eq!(
            paths,
            vec!["components/schemas/A/properties/x", "components/schemas/T/default"]
        );
    }

    #[test]
    fn test_recursive_schema_terminates() {
        let doc = document(
            json!({}),
            json!({"Tree": {"type": "object", "properties": {
                "children": {"type": "array", "items": {"$ref": "#/components/schemas/Tree"}}
            }}}),
        );
        assert!(validate_document(&doc, &ValidationConfig::default()).is_ok());
    }
}
