//! Schema tolerance: catalog introspection plus the immutable profile of
//! which optional columns and tables this deployment actually has.

pub mod introspect;
pub mod profile;

pub use introspect::SchemaIntrospector;
pub use profile::{QuantityColumn, SchemaProfile};
