//! Relation extraction: turn the values of selected fields into nodes
//! linked back to the records that referenced them

use crate::melt::types::{RecordBuffer, RelationSpec};
use indexmap::{IndexMap, IndexSet};

/// Values of one field, each with the records that referenced it
#[derive(Debug, Clone)]
pub struct RelationTable {
    pub spec: RelationSpec,
    /// First-seen order of values is the node order
    owners: IndexMap<String, IndexSet<u64>>,
}

impl RelationTable {
    pub fn new(spec: RelationSpec) -> Self {
        RelationTable {
            spec,
            owners: IndexMap::new(),
        }
    }

    pub fn add(&mut self, value: &str, owner: u64) {
        self.owners.entry(value.to_string()).or_default().insert(owner);
    }

    /// Number of distinct values
    pub fn node_count(&self) -> usize {
        self.owners.len()
    }

    pub fn edge_count(&self) -> usize {
        self.owners.values().map(IndexSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// `(node id, value)` with ids assigned sequentially from `offset`
    pub fn nodes(&self, offset: u64) -> impl Iterator<Item = (u64, &str)> {
        self.owners
            .keys()
            .enumerate()
            .map(move |(i, value)| (offset + i as u64, value.as_str()))
    }

    /// `(owner record id, node id)` pairs
    pub fn edges(&self, offset: u64) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.owners
            .values()
            .enumerate()
            .flat_map(move |(i, owners)| {
                let node = offset + i as u64;
                owners.iter().map(move |owner| (*owner, node))
            })
    }
}

/// Collects relation tables for every configured field during extraction
#[derive(Debug, Clone, Default)]
pub struct RelationExtractor {
    tables: Vec<RelationTable>,
}

impl RelationExtractor {
    pub fn new(specs: &[RelationSpec]) -> Self {
        RelationExtractor {
            tables: specs.iter().cloned().map(RelationTable::new).collect(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.tables.is_empty()
    }

    /// Record every value of the configured fields present in `record`
    pub fn record(&mut self, owner: u64, record: &RecordBuffer) {
        for table in &mut self.tables {
            if let Some(cell) = record.get(&table.spec.field) {
                for value in cell.values() {
                    table.add(value, owner);
                }
            }
        }
    }

    pub fn tables(&self) -> &[RelationTable] {
        &self.tables
    }

    pub fn into_tables(self) -> Vec<RelationTable> {
        self.tables
    }
}
