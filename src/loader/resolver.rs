//! `$ref` resolution into a [`SchemaArena`].
//!
//! Every schema is registered under the location it is defined at before its
//! children are built, so two references to the same target share one handle
//! and self-referential schemas resolve to themselves. Chains of references
//! that only alias each other are rejected as cycles.

use super::pointer;
use super::source::{fetch_external, parse_document};
use crate::cancellation::{Phase, checkpoint};
use crate::error::{OapitError, Result};
use crate::models::{
    AdditionalProperties, Annotations, ArrayRules, Composition, CompositionKind, Document,
    NumberRules, ObjectRules, OperationInfo, ParameterInfo, Pattern, RefSite, SchemaArena,
    SchemaId, SchemaKind, SchemaNode, SchemaUsage, StringRules, UntypedRules,
};
use crate::validation::ValidationMode;
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tokio_util::sync::CancellationToken;
use url::Url;

const METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

type Key = (Url, String);

/// A JSON pointer inside a particular document.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Location {
    doc: Url,
    pointer: String,
}

impl Location {
    fn new(doc: &Url, pointer: impl Into<String>) -> Self {
        Self {
            doc: doc.clone(),
            pointer: pointer.into(),
        }
    }

    fn child(&self, segment: &str) -> Self {
        Self {
            doc: self.doc.clone(),
            pointer: pointer::join(&self.pointer, segment),
        }
    }

    fn key(&self) -> Key {
        (self.doc.clone(), self.pointer.clone())
    }

    /// Pointer without the leading slash for the root document,
    /// `file#/pointer` relative to the root document otherwise.
    fn display(&self, base: &Url) -> String {
        if &self.doc == base {
            pointer::display(&self.pointer).to_string()
        } else {
            let doc = base
                .make_relative(&self.doc)
                .unwrap_or_else(|| self.doc.to_string());
            format!("{}#{}", doc, self.pointer)
        }
    }
}

/// Resolve every reference of `root` and build the [`Document`].
///
/// `base` is the URL of the root document; relative external references are
/// resolved against the document that contains them. External references fail
/// with `Reference` unless `allow_external` is set.
pub fn resolve_document(
    root: Value,
    base: Url,
    allow_external: bool,
    cancel: &CancellationToken,
) -> Result<Document> {
    let mut resolver = Resolver::new(root, base, allow_external, cancel);
    let components = resolver.resolve_components()?;
    resolver.walk_component_objects()?;
    resolver.walk_paths()?;
    resolver.finish(components)
}

struct Resolver<'c> {
    base: Url,
    allow_external: bool,
    cancel: &'c CancellationToken,
    documents: HashMap<Url, Rc<Value>>,
    slots: Vec<Option<SchemaNode>>,
    memo: HashMap<Key, SchemaId>,
    alias_chain: Vec<Key>,
    building: Vec<SchemaId>,
    walked: HashSet<Key>,
    usages: Vec<SchemaUsage>,
    operations: Vec<OperationInfo>,
    ref_sites: Vec<RefSite>,
    ref_site_keys: HashSet<Key>,
}

impl<'c> Resolver<'c> {
    fn new(root: Value, base: Url, allow_external: bool, cancel: &'c CancellationToken) -> Self {
        let mut documents = HashMap::new();
        documents.insert(base.clone(), Rc::new(root));
        Self {
            base,
            allow_external,
            cancel,
            documents,
            slots: Vec::new(),
            memo: HashMap::new(),
            alias_chain: Vec::new(),
            building: Vec::new(),
            walked: HashSet::new(),
            usages: Vec::new(),
            operations: Vec::new(),
            ref_sites: Vec::new(),
            ref_site_keys: HashSet::new(),
        }
    }

    fn root(&self) -> Rc<Value> {
        Rc::clone(&self.documents[&self.base])
    }

    fn resolve_components(&mut self) -> Result<IndexMap<String, SchemaId>> {
        let root = self.root();
        let mut components = IndexMap::new();
        let Some(schemas) = pointer::lookup(&root, "/components/schemas") else {
            return Ok(components);
        };
        let schemas = schemas
            .as_object()
            .ok_or_else(|| self.malformed("components/schemas", "a mapping"))?;

        let section = Location::new(&self.base, "/components/schemas");
        for name in schemas.keys() {
            let id = self.schema_at(&section.child(name))?;
            components.insert(name.clone(), id);
        }
        tracing::debug!(count = components.len(), "resolved schema components");
        Ok(components)
    }

    fn walk_component_objects(&mut self) -> Result<()> {
        let root = self.root();
        let Some(components) = root.get("components").and_then(Value::as_object) else {
            return Ok(());
        };

        let section = Location::new(&self.base, "/components");
        for (name, kind) in [
            ("parameters", ObjectKind::Parameter),
            ("requestBodies", ObjectKind::RequestBody),
            ("responses", ObjectKind::Response),
            ("headers", ObjectKind::Header),
        ] {
            let Some(entries) = components.get(name) else {
                continue;
            };
            let entries = entries
                .as_object()
                .ok_or_else(|| self.malformed(&format!("components/{}", name), "a mapping"))?;
            let loc = section.child(name);
            for entry in entries.keys() {
                self.walk_object(kind, loc.child(entry))?;
            }
        }
        Ok(())
    }

    fn walk_paths(&mut self) -> Result<()> {
        let root = self.root();
        let Some(paths) = root.get("paths") else {
            return Ok(());
        };
        let paths = paths
            .as_object()
            .ok_or_else(|| self.malformed("paths", "a mapping"))?;

        let section = Location::new(&self.base, "/paths");
        for path in paths.keys() {
            let (item_loc, item_root) = self.deref(section.child(path))?;
            let item = self.object_at(&item_root, &item_loc, "a path item")?;
            let shared = self.walk_parameters(&item_loc, item)?;

            for method in METHODS {
                let Some(operation) = item.get(method) else {
                    continue;
                };
                let op_loc = item_loc.child(method);
                let operation = operation
                    .as_object()
                    .ok_or_else(|| self.malformed(&op_loc.display(&self.base), "an operation"))?;

                let mut parameters = shared.clone();
                parameters.extend(self.walk_parameters(&op_loc, operation)?);

                if operation.contains_key("requestBody") {
                    self.walk_object(ObjectKind::RequestBody, op_loc.child("requestBody"))?;
                }

                let responses_loc = op_loc.child("responses");
                let has_responses = match operation.get("responses") {
                    Some(Value::Object(responses)) => {
                        for code in responses.keys() {
                            self.walk_object(ObjectKind::Response, responses_loc.child(code))?;
                        }
                        !responses.is_empty()
                    }
                    _ => false,
                };

                self.operations.push(OperationInfo {
                    location: op_loc.display(&self.base),
                    method: method.to_uppercase(),
                    path: path.clone(),
                    operation_id: operation
                        .get("operationId")
                        .and_then(Value::as_str)
                        .map(String::from),
                    has_responses,
                    parameters,
                });
            }
        }
        tracing::debug!(count = self.operations.len(), "walked operations");
        Ok(())
    }

    fn walk_parameters(&mut self, loc: &Location, owner: &Map<String, Value>) -> Result<Vec<ParameterInfo>> {
        let Some(parameters) = owner.get("parameters") else {
            return Ok(Vec::new());
        };
        let parameters = parameters
            .as_array()
            .ok_or_else(|| self.malformed(&loc.child("parameters").display(&self.base), "a list"))?;

        let list_loc = loc.child("parameters");
        (0..parameters.len())
            .map(|i| self.walk_parameter(list_loc.child(&i.to_string())))
            .collect()
    }

    fn walk_parameter(&mut self, loc: Location) -> Result<ParameterInfo> {
        let (loc, root) = self.deref(loc)?;
        let parameter = self.object_at(&root, &loc, "a parameter")?;
        let info = ParameterInfo {
            location: loc.display(&self.base),
            name: parameter.get("name").and_then(Value::as_str).map(String::from),
            position: parameter.get("in").and_then(Value::as_str).map(String::from),
            required: parameter
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };
        if self.walked.insert(loc.key()) {
            self.push_usage(&loc, parameter, ValidationMode::Request)?;
            self.walk_content(&loc, parameter, ValidationMode::Request)?;
        }
        Ok(info)
    }

    fn walk_object(&mut self, kind: ObjectKind, loc: Location) -> Result<()> {
        if kind == ObjectKind::Parameter {
            return self.walk_parameter(loc).map(|_| ());
        }

        let (loc, root) = self.deref(loc)?;
        if !self.walked.insert(loc.key()) {
            return Ok(());
        }
        let object = self.object_at(&root, &loc, kind.describe())?;
        match kind {
            ObjectKind::RequestBody => self.walk_content(&loc, object, ValidationMode::Request),
            ObjectKind::Response => {
                self.walk_content(&loc, object, ValidationMode::Response)?;
                if let Some(headers) = object.get("headers").and_then(Value::as_object) {
                    let headers_loc = loc.child("headers");
                    for name in headers.keys() {
                        self.walk_object(ObjectKind::Header, headers_loc.child(name))?;
                    }
                }
                Ok(())
            }
            ObjectKind::Header => {
                self.push_usage(&loc, object, ValidationMode::Response)?;
                self.walk_content(&loc, object, ValidationMode::Response)
            }
            ObjectKind::Parameter => Ok(()),
        }
    }

    fn walk_content(&mut self, loc: &Location, owner: &Map<String, Value>, mode: ValidationMode) -> Result<()> {
        let Some(content) = owner.get("content").and_then(Value::as_object) else {
            return Ok(());
        };
        let content_loc = loc.child("content");
        for (media_type, media) in content {
            let media_loc = content_loc.child(media_type);
            let media = media
                .as_object()
                .ok_or_else(|| self.malformed(&media_loc.display(&self.base), "a media type object"))?;
            self.push_usage(&media_loc, media, mode)?;
        }
        Ok(())
    }

    /// Record the schema and examples declared by a parameter, header or media type.
    fn push_usage(&mut self, loc: &Location, owner: &Map<String, Value>, mode: ValidationMode) -> Result<()> {
        let schema = if owner.contains_key("schema") {
            Some(self.schema_at(&loc.child("schema"))?)
        } else {
            None
        };

        let mut examples = Vec::new();
        if let Some(example) = owner.get("example") {
            examples.push((loc.child("example").display(&self.base), example.clone()));
        }
        if let Some(named) = owner.get("examples").and_then(Value::as_object) {
            let examples_loc = loc.child("examples");
            for name in named.keys() {
                let (example_loc, root) = self.deref(examples_loc.child(name))?;
                let example = self.object_at(&root, &example_loc, "an example object")?;
                if let Some(value) = example.get("value") {
                    examples.push((example_loc.child("value").display(&self.base), value.clone()));
                }
            }
        }

        if schema.is_some() || !examples.is_empty() {
            self.usages.push(SchemaUsage {
                location: loc.display(&self.base),
                schema,
                examples,
                mode,
            });
        }
        Ok(())
    }

    /// Resolve the schema defined or referenced at `loc`.
    fn schema_at(&mut self, loc: &Location) -> Result<SchemaId> {
        let key = loc.key();
        if let Some(&id) = self.memo.get(&key) {
            return Ok(id);
        }

        let root = self.document(&loc.doc)?;
        let value = pointer::lookup(&root, &loc.pointer).ok_or_else(|| {
            OapitError::reference(loc.display(&self.base), "pointer does not resolve")
        })?;

        if let Some(reference) = self.reference_of(loc, value)? {
            let target = self.target(loc, reference)?;
            if self.alias_chain.contains(&key) {
                return Err(OapitError::reference(
                    reference,
                    format!("cyclic reference at {}", loc.display(&self.base)),
                ));
            }
            self.alias_chain.push(key.clone());
            let resolved = self.schema_at(&target);
            self.alias_chain.pop();
            let id = resolved?;
            self.memo.insert(key, id);
            return Ok(id);
        }

        let object = value
            .as_object()
            .ok_or_else(|| self.malformed(&loc.display(&self.base), "a schema object"))?;

        let id = SchemaId(self.slots.len());
        self.slots.push(None);
        self.memo.insert(key, id);

        // A reference back into an alias chain from inside a real schema is
        // not itself an alias cycle.
        let chain = std::mem::take(&mut self.alias_chain);
        self.building.push(id);
        let node = self.build_node(loc, object);
        self.building.pop();
        self.alias_chain = chain;

        self.slots[id.0] = Some(node?);
        Ok(id)
    }

    fn build_node(&mut self, loc: &Location, schema: &Map<String, Value>) -> Result<SchemaNode> {
        let kind = match self.str_field(loc, schema, "type")? {
            None => SchemaKind::Untyped(Box::new(UntypedRules {
                string: self.string_rules(loc, schema)?,
                number: self.number_rules(loc, schema)?,
                array: self.array_rules(loc, schema)?,
                object: self.object_rules(loc, schema)?,
            })),
            Some("boolean") => SchemaKind::Boolean,
            Some("string") => SchemaKind::String(self.string_rules(loc, schema)?),
            Some("number") => SchemaKind::Number(self.number_rules(loc, schema)?),
            Some("integer") => SchemaKind::Integer(self.number_rules(loc, schema)?),
            Some("array") => SchemaKind::Array(self.array_rules(loc, schema)?),
            Some("object") => SchemaKind::Object(self.object_rules(loc, schema)?),
            Some(other) => SchemaKind::Unsupported(other.to_string()),
        };

        let mut compositions = Vec::new();
        for composition in [CompositionKind::AllOf, CompositionKind::AnyOf, CompositionKind::OneOf] {
            let keyword = composition.keyword();
            let Some(branches) = schema.get(keyword) else {
                continue;
            };
            let branches = branches
                .as_array()
                .ok_or_else(|| self.invalid(loc, keyword, "a list of schemas"))?;
            let list_loc = loc.child(keyword);
            let children = (0..branches.len())
                .map(|i| self.schema_at(&list_loc.child(&i.to_string())))
                .collect::<Result<Vec<_>>>()?;
            compositions.push(Composition {
                kind: composition,
                children,
            });
        }
        if schema.contains_key("not") {
            let child = self.schema_at(&loc.child("not"))?;
            compositions.push(Composition {
                kind: CompositionKind::Not,
                children: vec![child],
            });
        }

        let enumeration = match schema.get("enum") {
            None => None,
            Some(Value::Array(values)) => Some(values.clone()),
            Some(_) => return Err(self.invalid(loc, "enum", "a list")),
        };

        let annotations = Annotations {
            format: self.str_field(loc, schema, "format")?.map(String::from),
            enumeration,
            nullable: self.bool_field(loc, schema, "nullable")?,
            read_only: self.bool_field(loc, schema, "readOnly")?,
            write_only: self.bool_field(loc, schema, "writeOnly")?,
            default: schema.get("default").cloned(),
            example: schema.get("example").cloned(),
        };

        Ok(SchemaNode {
            location: loc.display(&self.base),
            kind,
            compositions,
            annotations,
        })
    }

    fn string_rules(&mut self, loc: &Location, schema: &Map<String, Value>) -> Result<StringRules> {
        Ok(StringRules {
            min_length: self.u64_field(loc, schema, "minLength")?,
            max_length: self.u64_field(loc, schema, "maxLength")?,
            pattern: self.str_field(loc, schema, "pattern")?.map(Pattern::new),
        })
    }

    fn number_rules(&mut self, loc: &Location, schema: &Map<String, Value>) -> Result<NumberRules> {
        Ok(NumberRules {
            minimum: self.f64_field(loc, schema, "minimum")?,
            maximum: self.f64_field(loc, schema, "maximum")?,
            exclusive_minimum: self.bool_field(loc, schema, "exclusiveMinimum")?,
            exclusive_maximum: self.bool_field(loc, schema, "exclusiveMaximum")?,
            multiple_of: self.f64_field(loc, schema, "multipleOf")?,
        })
    }

    fn array_rules(&mut self, loc: &Location, schema: &Map<String, Value>) -> Result<ArrayRules> {
        let items = if schema.contains_key("items") {
            Some(self.schema_at(&loc.child("items"))?)
        } else {
            None
        };
        Ok(ArrayRules {
            items,
            min_items: self.u64_field(loc, schema, "minItems")?,
            max_items: self.u64_field(loc, schema, "maxItems")?,
            unique_items: self.bool_field(loc, schema, "uniqueItems")?,
        })
    }

    fn object_rules(&mut self, loc: &Location, schema: &Map<String, Value>) -> Result<ObjectRules> {
        let mut properties = IndexMap::new();
        match schema.get("properties") {
            None => {}
            Some(Value::Object(entries)) => {
                let properties_loc = loc.child("properties");
                for name in entries.keys() {
                    let id = self.schema_at(&properties_loc.child(name))?;
                    properties.insert(name.clone(), id);
                }
            }
            Some(_) => return Err(self.invalid(loc, "properties", "a mapping")),
        }

        let required = match schema.get("required") {
            None => Vec::new(),
            Some(Value::Array(names)) => names
                .iter()
                .map(|name| {
                    name.as_str()
                        .map(String::from)
                        .ok_or_else(|| self.invalid(loc, "required", "a list of strings"))
                })
                .collect::<Result<_>>()?,
            Some(_) => return Err(self.invalid(loc, "required", "a list of strings")),
        };

        let additional_properties = match schema.get("additionalProperties") {
            None | Some(Value::Bool(true)) => AdditionalProperties::Allowed,
            Some(Value::Bool(false)) => AdditionalProperties::Forbidden,
            Some(Value::Object(_)) => {
                AdditionalProperties::Schema(self.schema_at(&loc.child("additionalProperties"))?)
            }
            Some(_) => {
                return Err(self.invalid(loc, "additionalProperties", "a boolean or a schema"));
            }
        };

        Ok(ObjectRules {
            properties,
            required,
            additional_properties,
            min_properties: self.u64_field(loc, schema, "minProperties")?,
            max_properties: self.u64_field(loc, schema, "maxProperties")?,
        })
    }

    /// Follow a chain of references to the object it ends at.
    fn deref(&mut self, loc: Location) -> Result<(Location, Rc<Value>)> {
        let mut current = loc;
        let mut seen: Vec<Key> = Vec::new();
        loop {
            let root = self.document(&current.doc)?;
            let value = pointer::lookup(&root, &current.pointer).ok_or_else(|| {
                OapitError::reference(current.display(&self.base), "pointer does not resolve")
            })?;
            let Some(reference) = self.reference_of(&current, value)? else {
                return Ok((current, root));
            };
            let target = self.target(&current, reference)?;
            seen.push(current.key());
            if seen.contains(&target.key()) {
                return Err(OapitError::reference(
                    reference,
                    format!("cyclic reference at {}", current.display(&self.base)),
                ));
            }
            current = target;
        }
    }

    /// The `$ref` of `value`, recording the reference site on first sight.
    fn reference_of<'v>(&mut self, loc: &Location, value: &'v Value) -> Result<Option<&'v str>> {
        let Some(object) = value.as_object() else {
            return Ok(None);
        };
        let Some(reference) = object.get("$ref") else {
            return Ok(None);
        };
        let reference = reference
            .as_str()
            .ok_or_else(|| self.invalid(loc, "$ref", "a string"))?;

        if self.ref_site_keys.insert(loc.key()) {
            self.ref_sites.push(RefSite {
                location: loc.display(&self.base),
                reference: reference.to_string(),
                siblings: object.keys().filter(|k| *k != "$ref").cloned().collect(),
                owner: self.building.last().copied(),
            });
        }
        Ok(Some(reference))
    }

    /// Where `reference`, written at `from`, points to.
    fn target(&self, from: &Location, reference: &str) -> Result<Location> {
        let (document, fragment) = reference.split_once('#').unwrap_or((reference, ""));
        let fragment = percent_decode_str(fragment)
            .decode_utf8()
            .map_err(|e| OapitError::reference(reference, format!("invalid fragment: {}", e)))?;
        if !fragment.is_empty() && !fragment.starts_with('/') {
            return Err(OapitError::reference(
                reference,
                "only JSON pointer fragments are supported",
            ));
        }

        if document.is_empty() {
            return Ok(Location::new(&from.doc, fragment));
        }

        if !self.allow_external {
            return Err(OapitError::reference(
                reference,
                format!(
                    "external references are disabled (referenced from {})",
                    from.display(&self.base)
                ),
            ));
        }

        let mut url = from
            .doc
            .join(document)
            .map_err(|e| OapitError::reference(reference, format!("invalid URL: {}", e)))?;
        url.set_fragment(None);
        Ok(Location::new(&url, fragment))
    }

    /// The parsed document at `url`, fetched on first use.
    fn document(&mut self, url: &Url) -> Result<Rc<Value>> {
        if let Some(document) = self.documents.get(url) {
            return Ok(Rc::clone(document));
        }

        checkpoint(self.cancel, Phase::Loading)?;
        tracing::debug!(%url, "loading external document");
        let content = fetch_external(url).map_err(|reason| OapitError::reference(url.as_str(), reason))?;
        let document = parse_document(&content)
            .map_err(|reason| OapitError::reference(url.as_str(), reason))?;

        let document = Rc::new(document);
        self.documents.insert(url.clone(), Rc::clone(&document));
        Ok(document)
    }

    fn object_at<'v>(&self, root: &'v Value, loc: &Location, expected: &str) -> Result<&'v Map<String, Value>> {
        pointer::lookup(root, &loc.pointer)
            .and_then(Value::as_object)
            .ok_or_else(|| self.malformed(&loc.display(&self.base), expected))
    }

    fn finish(self, components: IndexMap<String, SchemaId>) -> Result<Document> {
        let nodes = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| {
                    OapitError::reference(format!("schema #{}", i), "schema was never resolved")
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            schemas = nodes.len(),
            documents = self.documents.len(),
            "document resolved"
        );

        let mut documents = self.documents;
        let root = documents
            .remove(&self.base)
            .map(|shared| Rc::try_unwrap(shared).unwrap_or_else(|shared| (*shared).clone()))
            .unwrap_or_default();

        Ok(Document {
            root,
            arena: SchemaArena::from_nodes(nodes),
            components,
            usages: self.usages,
            operations: self.operations,
            ref_sites: self.ref_sites,
        })
    }

    fn str_field<'v>(&self, loc: &Location, schema: &'v Map<String, Value>, keyword: &str) -> Result<Option<&'v str>> {
        match schema.get(keyword) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(self.invalid(loc, keyword, "a string")),
        }
    }

    fn bool_field(&self, loc: &Location, schema: &Map<String, Value>, keyword: &str) -> Result<bool> {
        match schema.get(keyword) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(self.invalid(loc, keyword, "a boolean")),
        }
    }

    fn u64_field(&self, loc: &Location, schema: &Map<String, Value>, keyword: &str) -> Result<Option<u64>> {
        match schema.get(keyword) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.invalid(loc, keyword, "a non-negative integer")),
        }
    }

    fn f64_field(&self, loc: &Location, schema: &Map<String, Value>, keyword: &str) -> Result<Option<f64>> {
        match schema.get(keyword) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.invalid(loc, keyword, "a number")),
        }
    }

    fn invalid(&self, loc: &Location, keyword: &str, expected: &str) -> OapitError {
        self.malformed(&loc.child(keyword).display(&self.base), expected)
    }

    fn malformed(&self, location: &str, expected: &str) -> OapitError {
        OapitError::document_parse(
            self.base.as_str(),
            format!("{}: expected {}", location, expected),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Parameter,
    RequestBody,
    Response,
    Header,
}

impl ObjectKind {
    fn describe(self) -> &'static str {
        match self {
            ObjectKind::Parameter => "a parameter",
            ObjectKind::RequestBody => "a request body",
            ObjectKind::Response => "a response",
            ObjectKind::Header => "a header",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("file:///specs/openapi.yaml").unwrap()
    }

    fn resolve(root: Value) -> Result<Document> {
        resolve_document(root, base(), false, &CancellationToken::new())
    }

    fn object_rules(doc: &Document, id: SchemaId) -> &ObjectRules {
        match &doc.node(id).kind {
            SchemaKind::Object(rules) => rules,
            other => panic!("expected object schema, got {:?}", other),
        }
    }

    #[test]
    fn test_shared_reference_resolves_to_same_node() {
        let doc = resolve(json!({
            "components": {"schemas": {
                "Tag": {"type": "string"},
                "Pet": {"type": "object", "properties": {
                    "primary": {"$ref": "#/components/schemas/Tag"},
                    "secondary": {"$ref": "#/components/schemas/Tag"}
                }}
            }}
        }))
        .unwrap();

        let tag = doc.schema("Tag").unwrap();
        let pet = object_rules(&doc, doc.schema("Pet").unwrap());
        assert_eq!(pet.properties["primary"], tag);
        assert_eq!(pet.properties["secondary"], tag);
        assert_eq!(doc.arena.len(), 2);
    }

    #[test]
    fn test_percent_encoded_fragment_resolves() {
        let doc = resolve(json!({
            "components": {"schemas": {
                "My Pet": {"type": "string"},
                "Owner": {"type": "object", "properties": {
                    "pet": {"$ref": "#/components/schemas/My%20Pet"}
                }}
            }}
        }))
        .unwrap();

        let pet = doc.schema("My Pet").unwrap();
        assert_eq!(object_rules(&doc, doc.schema("Owner").unwrap()).properties["pet"], pet);
    }

    #[test]
    fn test_self_reference_terminates() {
        let doc = resolve(json!({
            "components": {"schemas": {
                "Node": {"type": "object", "properties": {
                    "next": {"$ref": "#/components/schemas/Node"}
                }}
            }}
        }))
        .unwrap();

        let node = doc.schema("Node").unwrap();
        assert_eq!(object_rules(&doc, node).properties["next"], node);
    }

    #[test]
    fn test_reference_to_later_alias_is_not_a_cycle() {
        let doc = resolve(json!({
            "components": {"schemas": {
                "Alias": {"$ref": "#/components/schemas/Tree"},
                "Tree": {"type": "object", "properties": {
                    "children": {"type": "array", "items": {"$ref": "#/components/schemas/Alias"}}
                }}
            }}
        }))
        .unwrap();

        let tree = doc.schema("Tree").unwrap();
        assert_eq!(doc.schema("Alias"), Some(tree));
        let children = object_rules(&doc, tree).properties["children"];
        match &doc.node(children).kind {
            SchemaKind::Array(rules) => assert_eq!(rules.items, Some(tree)),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_alias_cycle_is_rejected() {
        let err = resolve(json!({
            "components": {"schemas": {
                "A": {"$ref": "#/components/schemas/B"},
                "B": {"$ref": "#/components/schemas/A"}
            }}
        }))
        .unwrap_err();
        assert!(matches!(err, OapitError::Reference { .. }));
        assert!(err.to_string().contains("cyclic"));
    }

    #[test]
    fn test_missing_internal_reference() {
        let err = resolve(json!({
            "components": {"schemas": {
                "Pet": {"$ref": "#/components/schemas/Missing"}
            }}
        }))
        .unwrap_err();
        match err {
            OapitError::Reference { pointer, .. } => {
                assert_eq!(pointer, "components/schemas/Missing")
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_external_reference_disabled() {
        let err = resolve(json!({
            "components": {"schemas": {
                "Pet": {"$ref": "common.yaml#/components/schemas/Pet"}
            }}
        }))
        .unwrap_err();
        match err {
            OapitError::Reference { pointer, reason } => {
                assert_eq!(pointer, "common.yaml#/components/schemas/Pet");
                assert!(reason.contains("disabled"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_wrong_keyword_type_is_parse_error() {
        let err = resolve(json!({
            "components": {"schemas": {"Name": {"type": "string", "minLength": "three"}}}
        }))
        .unwrap_err();
        assert!(matches!(err, OapitError::DocumentParse { .. }));
        assert!(err.to_string().contains("components/schemas/Name/minLength"));
    }

    #[test]
    fn test_ref_sites_record_siblings() {
        let doc = resolve(json!({
            "components": {"schemas": {
                "Tag": {"type": "string"},
                "Pet": {"type": "object", "properties": {
                    "tag": {"$ref": "#/components/schemas/Tag", "description": "a tag"}
                }}
            }}
        }))
        .unwrap();

        assert_eq!(doc.ref_sites.len(), 1);
        let site = &doc.ref_sites[0];
        assert_eq!(site.location, "components/schemas/Pet/properties/tag");
        assert_eq!(site.siblings, vec!["description".to_string()]);
        assert_eq!(site.owner, doc.schema("Pet"));
    }

    #[test]
    fn test_component_alias_has_no_owner() {
        let doc = resolve(json!({
            "components": {"schemas": {
                "Pet": {"type": "object"},
                "Animal": {"$ref": "#/components/schemas/Pet"}
            }}
        }))
        .unwrap();

        assert_eq!(doc.ref_sites.len(), 1);
        assert_eq!(doc.ref_sites[0].location, "components/schemas/Animal");
        assert_eq!(doc.ref_sites[0].owner, None);
    }

    #[test]
    fn test_operations_and_usages_follow_references() {
        let doc = resolve(json!({
            "paths": {"/pets/{id}": {
                "parameters": [{"$ref": "#/components/parameters/PetId"}],
                "put": {
                    "operationId": "updatePet",
                    "requestBody": {"content": {"application/json": {
                        "schema": {"$ref": "#/components/schemas/Pet"},
                        "example": {"name": "Rex"}
                    }}},
                    "responses": {"200": {"$ref": "#/components/responses/PetResponse"}}
                }
            }},
            "components": {
                "schemas": {"Pet": {"type": "object"}},
                "parameters": {"PetId": {"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}}},
                "responses": {"PetResponse": {"description": "ok", "content": {"application/json": {
                    "schema": {"$ref": "#/components/schemas/Pet"}
                }}}}
            }
        }))
        .unwrap();

        assert_eq!(doc.operations.len(), 1);
        let op = &doc.operations[0];
        assert_eq!(op.method, "PUT");
        assert_eq!(op.operation_id.as_deref(), Some("updatePet"));
        assert!(op.has_responses);
        assert_eq!(op.parameters.len(), 1);
        assert_eq!(op.parameters[0].name.as_deref(), Some("id"));
        assert!(op.parameters[0].required);

        // parameter, response (components first) then the request body
        assert_eq!(doc.usages.len(), 3);
        let body = doc
            .usages
            .iter()
            .find(|u| u.location.contains("requestBody"))
            .unwrap();
        assert_eq!(body.schema, doc.schema("Pet"));
        assert_eq!(body.examples.len(), 1);
        assert_eq!(body.mode, ValidationMode::Request);
    }

    #[test]
    fn test_cancelled_before_external_fetch() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = resolve_document(
            json!({"components": {"schemas": {"Pet": {"$ref": "common.yaml#/Pet"}}}}),
            base(),
            true,
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, OapitError::Cancelled(Phase::Loading)));
    }
}
