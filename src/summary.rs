use crate::error::Result;
use crate::melt::extractor::ExtractStats;
use crate::melt::layout::{OutputLayout, RelationFiles};
use crate::melt::types::MeltConfig;
use crate::schema::discover::DiscoveredSchema;
use crate::schema::inference::TypeTag;
use serde::Serialize;
use std::path::PathBuf;

/// What a finished conversion wrote
#[derive(Debug, Clone, Serialize)]
pub struct ConversionSummary {
    pub tables: Vec<TableSummary>,
    pub relations: Vec<RelationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_script: Option<PathBuf>,
    /// Problems with the output that did not stop the run
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub record_type: String,
    pub rows: u64,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<PathBuf>,
    pub columns: Vec<ColumnSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub column_type: Option<TypeTag>,
    pub multi_valued: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationSummary {
    pub field: String,
    pub relation: String,
    pub nodes: usize,
    pub edges: usize,
    pub first_node_id: u64,
    pub nodes_path: PathBuf,
    pub edges_path: PathBuf,
}

impl ConversionSummary {
    pub(crate) fn build(
        schema: &DiscoveredSchema,
        stats: &ExtractStats,
        layout: &OutputLayout,
        relation_files: &[RelationFiles],
        import_script: Option<PathBuf>,
        warnings: Vec<String>,
        config: &MeltConfig,
    ) -> Result<Self> {
        let mut tables = Vec::with_capacity(schema.len());
        for record_type in schema.record_types() {
            let multi = stats.multi_valued.get(record_type);
            let mut columns = Vec::new();
            for name in schema.columns(record_type).into_iter().flatten() {
                let column_type = if config.annotates() {
                    Some(stats.types.reduced(record_type, name)?)
                } else {
                    None
                };
                columns.push(ColumnSummary {
                    name: name.clone(),
                    column_type,
                    multi_valued: multi.is_some_and(|m| m.contains(name)),
                });
            }

            tables.push(TableSummary {
                record_type: record_type.to_string(),
                rows: stats.rows(record_type),
                path: layout.table_path(record_type),
                header: config.annotates().then(|| layout.header_path(record_type)),
                columns,
            });
        }

        let relations = stats
            .relations
            .iter()
            .zip(relation_files)
            .map(|(table, files)| RelationSummary {
                field: table.spec.field.clone(),
                relation: table.spec.relation.clone(),
                nodes: table.node_count(),
                edges: table.edge_count(),
                first_node_id: files.offset,
                nodes_path: files.nodes.clone(),
                edges_path: files.edges.clone(),
            })
            .collect();

        Ok(ConversionSummary {
            tables,
            relations,
            import_script,
            warnings,
        })
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}
