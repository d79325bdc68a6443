//! Column type inference
//!
//! Classifies individual cell values into a small closed set of types and
//! reduces everything observed for a column into one representative type.

use crate::error::{ConvertError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

// Pre-compiled regex patterns, built once per process
static FLOAT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+\.\d+$").unwrap()
});

static DATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap()
});

static DATETIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}(:\d{2})?$").unwrap()
});

/// Type identifier for a single cell value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Empty,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    String,
}

impl TypeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Empty => "empty",
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::Boolean => "boolean",
            TypeTag::Date => "date",
            TypeTag::DateTime => "datetime",
            TypeTag::String => "string",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every tag observed for one column
pub type TypeSet = BTreeSet<TypeTag>;

/// Classify a single value. The first matching rule wins.
pub fn classify(value: &str) -> TypeTag {
    if value.is_empty() {
        return TypeTag::Empty;
    }

    if value.bytes().all(|b| b.is_ascii_digit()) && value.parse::<i64>().is_ok() {
        return TypeTag::Integer;
    }

    if FLOAT_REGEX.is_match(value) && value.parse::<f64>().is_ok() {
        return TypeTag::Float;
    }

    // Length checks before regex, same as the format detectors
    if value.len() == 10 && DATE_REGEX.is_match(value) && is_calendar_date(value) {
        return TypeTag::Date;
    }

    if value.len() >= 16 && DATETIME_REGEX.is_match(value) && is_datetime(value) {
        return TypeTag::DateTime;
    }

    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
        return TypeTag::Boolean;
    }

    TypeTag::String
}

fn is_calendar_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn is_datetime(s: &str) -> bool {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").is_ok()
}

/// Reduce a column's observed tags to one type.
///
/// Only depends on set membership, so the order values arrived in never
/// changes the outcome.
pub fn reduce(tags: &TypeSet) -> Result<TypeTag> {
    if tags.is_empty() {
        return Err(ConvertError::Internal(
            "type reduction requested for a column with no observations".to_string(),
        ));
    }

    let mut present: Vec<TypeTag> = tags
        .iter()
        .copied()
        .filter(|t| *t != TypeTag::Empty)
        .collect();

    // Only empty values were seen
    if present.is_empty() {
        return Ok(TypeTag::String);
    }

    if present.len() == 1 {
        return Ok(present.remove(0));
    }

    let reduced = match present.as_slice() {
        [TypeTag::Integer, TypeTag::Float] => TypeTag::Float,
        [TypeTag::Date, TypeTag::DateTime] => TypeTag::DateTime,
        _ => TypeTag::String,
    };

    Ok(reduced)
}

/// Accumulates type tags per (record type, column) across a whole pass
#[derive(Debug, Default)]
pub struct TypeObservations {
    tags: HashMap<String, HashMap<String, TypeSet>>,
}

impl TypeObservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `value` and record the result under the given column
    pub fn observe(&mut self, record_type: &str, column: &str, value: &str) {
        self.tags
            .entry(record_type.to_string())
            .or_default()
            .entry(column.to_string())
            .or_default()
            .insert(classify(value));
    }

    pub fn tags(&self, record_type: &str, column: &str) -> Option<&TypeSet> {
        self.tags.get(record_type).and_then(|c| c.get(column))
    }

    /// Reduced type for a column that must have been observed
    pub fn reduced(&self, record_type: &str, column: &str) -> Result<TypeTag> {
        let tags = self.tags(record_type, column).ok_or_else(|| {
            ConvertError::Internal(format!(
                "column {:?} of {:?} was discovered but never observed",
                column, record_type
            ))
        })?;
        reduce(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tags: &[TypeTag]) -> TypeSet {
        tags.iter().copied().collect()
    }

    #[test]
    fn test_classify_precedence() {
        assert_eq!(classify(""), TypeTag::Empty);
        assert_eq!(classify("2021"), TypeTag::Integer);
        assert_eq!(classify("3.14"), TypeTag::Float);
        assert_eq!(classify("2021-05-01"), TypeTag::Date);
        assert_eq!(classify("2021-05-01 10:00"), TypeTag::DateTime);
        assert_eq!(classify("2021-05-01 10:00:59"), TypeTag::DateTime);
        assert_eq!(classify("TRUE"), TypeTag::Boolean);
        assert_eq!(classify("false"), TypeTag::Boolean);
        assert_eq!(classify("hello"), TypeTag::String);
    }

    #[test]
    fn test_classify_rejects_near_misses() {
        // Sign and exponent are not part of the integer/float shapes
        assert_eq!(classify("-5"), TypeTag::String);
        assert_eq!(classify("1e5"), TypeTag::String);
        assert_eq!(classify(".5"), TypeTag::String);
        // Overflowing digit runs are not integers
        assert_eq!(classify("99999999999999999999999"), TypeTag::String);
        // Shape matches but the calendar does not
        assert_eq!(classify("2021-02-30"), TypeTag::String);
        assert_eq!(classify("2021-05-01 25:00"), TypeTag::String);
        assert_eq!(classify("2021-05-01T10:00"), TypeTag::String);
    }

    #[test]
    fn test_reduce_rules() {
        assert_eq!(reduce(&set(&[TypeTag::Date])).unwrap(), TypeTag::Date);
        assert_eq!(
            reduce(&set(&[TypeTag::Date, TypeTag::DateTime])).unwrap(),
            TypeTag::DateTime
        );
        assert_eq!(
            reduce(&set(&[TypeTag::Date, TypeTag::DateTime, TypeTag::String])).unwrap(),
            TypeTag::String
        );
        assert_eq!(
            reduce(&set(&[TypeTag::Integer, TypeTag::Float, TypeTag::Empty])).unwrap(),
            TypeTag::Float
        );
        assert_eq!(
            reduce(&set(&[TypeTag::Integer, TypeTag::Boolean])).unwrap(),
            TypeTag::String
        );
        assert_eq!(
            reduce(&set(&[TypeTag::Integer, TypeTag::Float, TypeTag::Date])).unwrap(),
            TypeTag::String
        );
        assert_eq!(reduce(&set(&[TypeTag::Empty])).unwrap(), TypeTag::String);
    }

    #[test]
    fn test_reduce_empty_set_is_internal_error() {
        assert!(matches!(reduce(&TypeSet::new()), Err(ConvertError::Internal(_))));
    }

    #[test]
    fn test_reduction_ignores_arrival_order() {
        let values = ["2021-05-01", "2021-05-01 10:00", "", "2020-01-01"];
        let mut forward = TypeObservations::new();
        for v in values {
            forward.observe("article", "mdate", v);
        }
        let mut backward = TypeObservations::new();
        for v in values.iter().rev() {
            backward.observe("article", "mdate", v);
            // Repeats do not change the set
            backward.observe("article", "mdate", v);
        }

        assert_eq!(
            forward.reduced("article", "mdate").unwrap(),
            backward.reduced("article", "mdate").unwrap()
        );
        assert_eq!(forward.reduced("article", "mdate").unwrap(), TypeTag::DateTime);
    }

    #[test]
    fn test_unobserved_column_is_internal_error() {
        let observations = TypeObservations::new();
        assert!(observations.reduced("article", "title").is_err());
    }
}
