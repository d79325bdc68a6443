//! First pass: discover the full column set of every record type
//!
//! Streams the document once and accumulates, per record type, the union of
//! all flattened column names. Nothing but column names is retained.

use crate::error::{ConvertError, Result};
use crate::source::{DocEvent, EventSource};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

/// Column reserved for generated row identifiers
pub const ID_COLUMN: &str = "id";

/// Compound column name for an attribute of a leaf child
pub fn compound_column(child: &str, attribute: &str) -> String {
    format!("{}-{}", child, attribute)
}

/// Column sets per record type, as seen across the whole document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveredSchema {
    columns: BTreeMap<String, BTreeSet<String>>,
}

impl DiscoveredSchema {
    pub fn record_types(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn contains(&self, record_type: &str) -> bool {
        self.columns.contains_key(record_type)
    }

    /// Sorted columns of a record type, excluding `id`
    pub fn columns(&self, record_type: &str) -> Option<&BTreeSet<String>> {
        self.columns.get(record_type)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Accumulates column names from a stream of document events
#[derive(Debug)]
pub struct SchemaDiscoverer {
    record_types: HashSet<String>,
    columns: BTreeMap<String, BTreeSet<String>>,
    current: Option<String>,
}

impl SchemaDiscoverer {
    pub fn new<I, S>(record_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SchemaDiscoverer {
            record_types: record_types.into_iter().map(Into::into).collect(),
            columns: BTreeMap::new(),
            current: None,
        }
    }

    /// Run a full pass over a fresh stream from `source`
    pub fn discover<S: EventSource + ?Sized>(mut self, source: &S) -> Result<DiscoveredSchema> {
        for event in source.open()? {
            self.observe(event?)?;
        }
        Ok(self.finish())
    }

    /// Feed one event into the accumulator
    pub fn observe(&mut self, event: DocEvent) -> Result<()> {
        match event {
            DocEvent::Open { name, attributes, depth: 1 }
                if self.current.is_none() && self.record_types.contains(&name) =>
            {
                // Entry exists for every opened record; empty sets are dropped in finish()
                let columns = self.columns.entry(name.clone()).or_default();
                for (key, _) in attributes {
                    if key == ID_COLUMN {
                        return Err(ConvertError::InvalidColumnName {
                            column: key,
                            tag: name.clone(),
                            record_type: name,
                        });
                    }
                    columns.insert(key);
                }
                self.current = Some(name);
            }
            DocEvent::Close { name, attributes, text, depth } => {
                let Some(record_type) = self.current.as_deref() else {
                    return Ok(());
                };

                if depth == 1 && name == record_type {
                    self.current = None;
                } else if text.is_some() {
                    if name == ID_COLUMN {
                        return Err(ConvertError::InvalidColumnName {
                            column: name.clone(),
                            tag: name,
                            record_type: record_type.to_string(),
                        });
                    }
                    if let Some(columns) = self.columns.get_mut(record_type) {
                        for (key, _) in &attributes {
                            columns.insert(compound_column(&name, key));
                        }
                        columns.insert(name);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Build the schema, dropping record types that never produced a column
    pub fn finish(self) -> DiscoveredSchema {
        let columns: BTreeMap<String, BTreeSet<String>> = self
            .columns
            .into_iter()
            .filter(|(_, columns)| !columns.is_empty())
            .collect();

        for record_type in &self.record_types {
            if !columns.contains_key(record_type) {
                debug!(record_type = %record_type, "no columns observed, no table will be written");
            }
        }
        info!(record_types = columns.len(), "schema discovery finished");

        DiscoveredSchema { columns }
    }
}

#[cfg(test)]
impl DiscoveredSchema {
    pub(crate) fn from_columns(columns: &[(&str, &[&str])]) -> Self {
        DiscoveredSchema {
            columns: columns
                .iter()
                .map(|(rt, cols)| (rt.to_string(), cols.iter().map(|c| c.to_string()).collect()))
                .collect(),
        }
    }
}
