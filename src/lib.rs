//! # xmlmelt - hierarchical records to relational tables
//!
//! Converts a large XML record corpus (such as the DBLP dump) into one flat
//! delimited table per record type, with optional type-annotated headers,
//! relation node/edge tables and a graph-store bulk-import command.
//!
//! ## Modules
//!
//! - **schema**: first pass column discovery and value type inference
//! - **melt**: second pass record extraction, relations and output layout
//! - **source**: re-openable forward-only document event streams
//! - **dtd**: record types and entities declared by the document's DTD
//!
//! ## Quick Start
//!
//! ```rust
//! use xmlmelt::{convert, MeltConfig, RelationSpec, XmlSource};
//!
//! # fn main() -> xmlmelt::Result<()> {
//! let dir = std::env::temp_dir().join("xmlmelt-doc");
//! let source = XmlSource::from_bytes(
//!     "<dblp><article><title>A</title><author>X</author><author>Y</author></article></dblp>",
//! );
//! let config = MeltConfig {
//!     relations: vec![RelationSpec::new("author", "authored_by")],
//!     ..MeltConfig::default()
//! };
//!
//! let summary = convert(&source, ["article"], dir.join("dblp.csv"), &config)?;
//! assert_eq!(summary.total_rows(), 1);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use tracing::{info, warn};

pub mod dtd;
pub mod error;
pub mod melt;
pub mod schema;
pub mod source;
pub mod summary;

// Re-export commonly used types for convenience
pub use error::{ConvertError, Result};
pub use melt::{MeltConfig, OutputLayout, RecordExtractor, RelationSpec, TableWriter};
pub use schema::{DiscoveredSchema, SchemaDiscoverer, TypeTag};
pub use source::{DocEvent, EventSource, XmlSource};
pub use summary::ConversionSummary;

use melt::layout;

/// Main entry point: run both passes over `source` and write every table.
///
/// A reserved column name, or two outputs mapping to the same file, aborts
/// the run before any file is opened. Any failure after that removes the
/// files this run may have created.
pub fn convert<S, I, T>(
    source: &S,
    record_types: I,
    output: impl AsRef<Path>,
    config: &MeltConfig,
) -> Result<ConversionSummary>
where
    S: EventSource + ?Sized,
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    info!("Finding unique columns for all record types...");
    let schema = SchemaDiscoverer::new(record_types).discover(source)?;

    let layout = OutputLayout::new(output);
    let planned = layout.planned_paths(&schema, &config.relations);
    layout::ensure_distinct(&planned)?;

    match write_outputs(source, &schema, &layout, config) {
        Ok(summary) => Ok(summary),
        Err(e) => {
            for path in planned {
                if path.exists() {
                    if let Err(remove_err) = std::fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %remove_err, "failed to remove partial output");
                    }
                }
            }
            Err(e)
        }
    }
}

/// Convert an XML file whose record types and entities are declared in `dtd_path`
pub fn convert_file(
    xml_path: impl AsRef<Path>,
    dtd_path: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &MeltConfig,
) -> Result<ConversionSummary> {
    info!("Reading elements from DTD file...");
    let dtd = dtd::Dtd::from_path(dtd_path)?;
    info!(elements = dtd.elements.len(), entities = dtd.entities.len(), "read DTD");

    let source = XmlSource::from_path(xml_path.as_ref()).with_entities(dtd.entities);
    convert(&source, dtd.elements, output, config)
}

fn write_outputs<S: EventSource + ?Sized>(
    source: &S,
    schema: &DiscoveredSchema,
    layout: &OutputLayout,
    config: &MeltConfig,
) -> Result<ConversionSummary> {
    info!("Opening output files...");
    let mut tables = TableWriter::create(schema, layout, config)?;

    info!("Parsing XML and writing tables...");
    let stats = RecordExtractor::new(schema, config).extract(source, &mut tables)?;
    tables.flush()?;
    drop(tables);

    if config.annotates() {
        layout::write_annotated_headers(schema, layout, &stats.types, &stats.multi_valued, config)?;
    }

    let relation_files = layout::write_relations(&stats.relations, stats.first_free_id(), layout, config)?;

    let mut warnings = Vec::new();
    let import_script = if config.graph_store {
        if schema.len() > 1 {
            let message = format!(
                "record ids restart at 0 for each of the {} record types, so the import sees duplicate node ids",
                schema.len()
            );
            warn!("{}", message);
            warnings.push(message);
        }
        let command = layout::import_command(schema, layout, &stats.relations, &relation_files, config);
        Some(layout::write_import_script(layout, &command)?)
    } else {
        None
    };

    ConversionSummary::build(schema, &stats, layout, &relation_files, import_script, warnings, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let source = XmlSource::from_bytes(
            r#"<dblp><article key="a"><title>T</title></article><www><url>u</url></www></dblp>"#,
        );

        let summary = convert(&source, ["article", "www"], dir.path().join("out.csv"), &MeltConfig::default())
            .unwrap();

        assert_eq!(summary.tables.len(), 2);
        assert_eq!(summary.total_rows(), 2);
        let article = std::fs::read_to_string(dir.path().join("out_article.csv")).unwrap();
        assert_eq!(article, "id;key;title\n0;a;T\n");
    }
}
