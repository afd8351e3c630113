use super::schema::{SchemaArena, SchemaId, SchemaNode};
use crate::error::{OapitError, Result};
use crate::validation::ValidationMode;
use indexmap::IndexMap;
use serde_json::Value;

/// A loaded OpenAPI document with every schema reference resolved.
#[derive(Debug, Clone)]
pub struct Document {
    /// The root document as parsed, for document-level checks
    pub root: Value,

    /// Every resolved schema
    pub arena: SchemaArena,

    /// `components/schemas`, in declaration order
    pub components: IndexMap<String, SchemaId>,

    /// Schemas used by parameters, bodies, responses and headers
    pub usages: Vec<SchemaUsage>,

    /// Operations found under `paths`
    pub operations: Vec<OperationInfo>,

    /// Every `$ref` object met during resolution
    pub ref_sites: Vec<RefSite>,
}

impl Document {
    /// Look up a schema component by name.
    pub fn schema(&self, name: &str) -> Option<SchemaId> {
        self.components.get(name).copied()
    }

    /// Look up a schema component, failing with `SchemaNotFound`.
    pub fn require_schema(&self, name: &str) -> Result<SchemaId> {
        self.schema(name)
            .ok_or_else(|| OapitError::SchemaNotFound(name.to_string()))
    }

    pub fn node(&self, id: SchemaId) -> &SchemaNode {
        self.arena.get(id)
    }

    /// The `openapi` version string, if any
    pub fn openapi_version(&self) -> Option<&str> {
        self.root.get("openapi").and_then(Value::as_str)
    }
}

/// A schema attached to a parameter, media type or header, with the examples
/// declared next to it.
#[derive(Debug, Clone)]
pub struct SchemaUsage {
    pub location: String,
    pub schema: Option<SchemaId>,
    pub examples: Vec<(String, Value)>,
    /// Request for parameters and request bodies, response for responses
    pub mode: ValidationMode,
}

#[derive(Debug, Clone)]
pub struct OperationInfo {
    pub location: String,
    pub method: String,
    pub path: String,
    pub operation_id: Option<String>,
    pub has_responses: bool,
    pub parameters: Vec<ParameterInfo>,
}

#[derive(Debug, Clone)]
pub struct ParameterInfo {
    pub location: String,
    pub name: Option<String>,
    pub position: Option<String>,
    pub required: bool,
}

/// A `$ref` object and the other keys written next to it.
#[derive(Debug, Clone)]
pub struct RefSite {
    pub location: String,
    pub reference: String,
    pub siblings: Vec<String>,
    /// Schema whose keyword holds the reference; `None` for references met
    /// outside a schema (a component alias, a media type `schema`, a
    /// parameter or response object)
    pub owner: Option<SchemaId>,
}
