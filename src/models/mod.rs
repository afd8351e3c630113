pub mod document;
pub mod schema;

pub use document::{Document, OperationInfo, ParameterInfo, RefSite, SchemaUsage};
pub use schema::{
    AdditionalProperties, Annotations, ArrayRules, Composition, CompositionKind, NumberRules,
    ObjectRules, Pattern, SchemaArena, SchemaId, SchemaKind, SchemaNode, StringRules,
    UntypedRules,
};
