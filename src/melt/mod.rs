//! Record melting - flatten two-level records into relational tables
//!
//! This module handles the second pass of a conversion: extracting one row
//! per record, diverting selected fields into relation tables and laying the
//! results out on disk.

pub mod types;
pub mod extractor;
pub mod relations;
pub mod writer;
pub mod layout;

pub use types::{Cell, MeltConfig, RecordBuffer, RelationSpec};
pub use extractor::{ExtractStats, RecordExtractor};
pub use relations::{RelationExtractor, RelationTable};
pub use writer::{RowSink, TableWriter};
pub use layout::{OutputLayout, RelationFiles};
