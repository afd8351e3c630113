use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

/// Handle of a resolved schema inside a [`SchemaArena`].
///
/// Two references to the same target share one handle, and a schema that
/// refers to itself holds its own handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(pub(crate) usize);

/// Owner of every resolved schema node of a document.
#[derive(Debug, Clone, Default)]
pub struct SchemaArena {
    nodes: Vec<SchemaNode>,
}

impl SchemaArena {
    pub(crate) fn from_nodes(nodes: Vec<SchemaNode>) -> Self {
        Self { nodes }
    }

    pub fn get(&self, id: SchemaId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// A resolved schema.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// Where the schema is defined, e.g. `components/schemas/Pet`.
    pub location: String,
    pub kind: SchemaKind,
    pub compositions: Vec<Composition>,
    pub annotations: Annotations,
}

impl SchemaNode {
    /// Handles of every directly nested schema, in keyword order.
    pub fn children(&self) -> Vec<SchemaId> {
        fn push_object(rules: &ObjectRules, out: &mut Vec<SchemaId>) {
            out.extend(rules.properties.values().copied());
            if let AdditionalProperties::Schema(id) = rules.additional_properties {
                out.push(id);
            }
        }

        let mut children = Vec::new();
        match &self.kind {
            SchemaKind::Array(rules) => children.extend(rules.items),
            SchemaKind::Object(rules) => push_object(rules, &mut children),
            SchemaKind::Untyped(rules) => {
                children.extend(rules.array.items);
                push_object(&rules.object, &mut children);
            }
            _ => {}
        }
        for composition in &self.compositions {
            children.extend(composition.children.iter().copied());
        }
        children
    }
}

/// The `type` of a schema, each variant carrying only its own rules.
#[derive(Debug, Clone)]
pub enum SchemaKind {
    /// No `type`: rules are applied according to the value's runtime type.
    Untyped(Box<UntypedRules>),
    Boolean,
    String(StringRules),
    Number(NumberRules),
    Integer(NumberRules),
    Array(ArrayRules),
    Object(ObjectRules),
    /// A `type` value outside OpenAPI 3.0.
    Unsupported(String),
}

#[derive(Debug, Clone, Default)]
pub struct UntypedRules {
    pub string: StringRules,
    pub number: NumberRules,
    pub array: ArrayRules,
    pub object: ObjectRules,
}

#[derive(Debug, Clone, Default)]
pub struct StringRules {
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub pattern: Option<Pattern>,
}

#[derive(Debug, Clone, Default)]
pub struct NumberRules {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: bool,
    pub exclusive_maximum: bool,
    pub multiple_of: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ArrayRules {
    pub items: Option<SchemaId>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectRules {
    pub properties: IndexMap<String, SchemaId>,
    pub required: Vec<String>,
    pub additional_properties: AdditionalProperties,
    pub min_properties: Option<u64>,
    pub max_properties: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdditionalProperties {
    #[default]
    Allowed,
    Forbidden,
    Schema(SchemaId),
}

/// A `pattern` keyword and the outcome of compiling it.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub source: String,
    compiled: std::result::Result<Regex, regex::Error>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = Regex::new(&source);
        Self { source, compiled }
    }

    pub fn regex(&self) -> std::result::Result<&Regex, &regex::Error> {
        self.compiled.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionKind {
    AllOf,
    AnyOf,
    OneOf,
    Not,
}

impl CompositionKind {
    pub fn keyword(self) -> &'static str {
        match self {
            CompositionKind::AllOf => "allOf",
            CompositionKind::AnyOf => "anyOf",
            CompositionKind::OneOf => "oneOf",
            CompositionKind::Not => "not",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Composition {
    pub kind: CompositionKind,
    pub children: Vec<SchemaId>,
}

/// Keywords that apply regardless of the schema kind.
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    pub format: Option<String>,
    pub enumeration: Option<Vec<Value>>,
    pub nullable: bool,
    pub read_only: bool,
    pub write_only: bool,
    pub default: Option<Value>,
    pub example: Option<Value>,
}
