use std::collections::HashMap;
use std::str::FromStr;

/// The value of one column within one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Scalar(String),
    /// The column occurred more than once in the record, in arrival order
    Multi(Vec<String>),
}

impl Cell {
    /// Add another occurrence, promoting a scalar to a list on the second one
    pub fn push(&mut self, value: String) {
        match self {
            Cell::Scalar(first) => {
                let first = std::mem::take(first);
                *self = Cell::Multi(vec![first, value]);
            }
            Cell::Multi(values) => values.push(value),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Cell::Multi(_))
    }

    /// Individual values, in arrival order
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Cell::Scalar(value) => std::slice::from_ref(value),
            Cell::Multi(values) => values,
        };
        slice.iter().map(String::as_str)
    }

    /// Collapse to a scalar: lists are sorted and joined with `separator`
    pub fn join(&mut self, separator: &str) {
        if let Cell::Multi(values) = self {
            values.sort();
            let joined = values.join(separator);
            *self = Cell::Scalar(joined);
        }
    }

    /// The scalar text, or `None` for a list that has not been joined yet
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Cell::Scalar(value) => Some(value.as_str()),
            Cell::Multi(_) => None,
        }
    }
}

/// Column values of the record currently being extracted
#[derive(Debug, Default)]
pub struct RecordBuffer {
    cells: HashMap<String, Cell>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a value into a column; returns true when the column just became multi-valued
    pub fn merge(&mut self, column: &str, value: String) -> bool {
        match self.cells.get_mut(column) {
            Some(cell) => {
                let promoted = !cell.is_multi();
                cell.push(value);
                promoted
            }
            None => {
                self.cells.insert(column.to_string(), Cell::Scalar(value));
                false
            }
        }
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Columns holding more than one value
    pub fn multi_valued(&self) -> impl Iterator<Item = &str> {
        self.cells
            .iter()
            .filter(|(_, cell)| cell.is_multi())
            .map(|(k, _)| k.as_str())
    }

    /// Join every multi-valued cell into a scalar
    pub fn join_multi(&mut self, separator: &str) {
        for cell in self.cells.values_mut() {
            cell.join(separator);
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }
}

/// A field whose values become nodes of a relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    /// Flattened column name the values are taken from
    pub field: String,
    /// Name of the relation linking records to those values
    pub relation: String,
}

impl RelationSpec {
    pub fn new(field: impl Into<String>, relation: impl Into<String>) -> Self {
        RelationSpec {
            field: field.into(),
            relation: relation.into(),
        }
    }
}

impl FromStr for RelationSpec {
    type Err = String;

    /// Parses `field:relation`, or a bare `field` naming its own relation
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, relation) = match s.split_once(':') {
            Some((field, relation)) => (field.trim(), relation.trim()),
            None => (s.trim(), s.trim()),
        };
        if field.is_empty() || relation.is_empty() {
            return Err(format!("invalid relation {:?}, expected FIELD[:RELATION]", s));
        }
        Ok(RelationSpec::new(field, relation))
    }
}

/// Configuration for the conversion
#[derive(Debug, Clone)]
pub struct MeltConfig {
    /// Field delimiter of every written table
    pub delimiter: u8,

    /// Separator placed between the sorted values of a multi-valued cell
    pub multi_value_separator: String,

    /// Write type-annotated headers into sibling header files
    pub annotate_types: bool,

    /// Lay out the output for a graph-store bulk import (implies annotation)
    pub graph_store: bool,

    /// Fields extracted into relation node/edge tables
    pub relations: Vec<RelationSpec>,

    /// Target database named in the generated import command
    pub database: String,
}

impl MeltConfig {
    /// Whether column types have to be inferred during extraction
    pub fn annotates(&self) -> bool {
        self.annotate_types || self.graph_store
    }
}

impl Default for MeltConfig {
    fn default() -> Self {
        MeltConfig {
            delimiter: b';',
            multi_value_separator: String::from("|"),
            annotate_types: false,
            graph_store: false,
            relations: vec![],
            database: String::from("graph.db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_promotion() {
        let mut buffer = RecordBuffer::new();
        assert!(!buffer.merge("author", "Y".to_string()));
        assert!(buffer.merge("author", "X".to_string()));
        assert!(!buffer.merge("author", "W".to_string()));

        let values: Vec<&str> = buffer.get("author").unwrap().values().collect();
        assert_eq!(values, vec!["Y", "X", "W"]);
        assert_eq!(buffer.multi_valued().collect::<Vec<_>>(), vec!["author"]);
    }

    #[test]
    fn test_join_sorts_values() {
        let mut cell = Cell::Scalar("Y".to_string());
        cell.push("X".to_string());
        cell.join("|");
        assert_eq!(cell.as_scalar(), Some("X|Y"));

        let mut scalar = Cell::Scalar("b|a".to_string());
        scalar.join("|");
        assert_eq!(scalar.as_scalar(), Some("b|a"));
    }

    #[test]
    fn test_relation_spec_parsing() {
        assert_eq!(
            "author:authored_by".parse::<RelationSpec>().unwrap(),
            RelationSpec::new("author", "authored_by")
        );
        assert_eq!("ee".parse::<RelationSpec>().unwrap(), RelationSpec::new("ee", "ee"));
        assert!(":x".parse::<RelationSpec>().is_err());
    }
}
