pub mod openapi;
pub mod pointer;
pub mod resolver;
pub mod source;

pub use openapi::{LoadOptions, load_document, load_openapi};
pub use resolver::resolve_document;
pub use source::{Source, read_document, read_payload};
