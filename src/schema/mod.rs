//! Schema discovery and column type inference
//!
//! The first pass discovers every column of every record type; the type
//! inferencer classifies values seen during the second pass.

pub mod discover;
pub mod inference;

pub use discover::{DiscoveredSchema, SchemaDiscoverer};
pub use inference::{classify, reduce, TypeObservations, TypeTag};
