//! Second pass: extract one flat row per record
//!
//! The extractor walks a fresh event stream with a two-state machine. Only
//! the fields of the record currently open are held; they are emitted or
//! discarded when the record closes.

use crate::error::Result;
use crate::melt::relations::{RelationExtractor, RelationTable};
use crate::melt::types::{MeltConfig, RecordBuffer};
use crate::melt::writer::RowSink;
use crate::schema::discover::{compound_column, DiscoveredSchema};
use crate::schema::inference::TypeObservations;
use crate::source::{DocEvent, EventSource};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Outside,
    InsideRecord(String),
}

/// What the extraction pass learned besides the rows themselves
#[derive(Debug, Default)]
pub struct ExtractStats {
    /// Rows emitted per record type
    pub rows: BTreeMap<String, u64>,
    /// Type tags per column; only filled when types are annotated
    pub types: TypeObservations,
    /// Columns that held several values in at least one record
    pub multi_valued: HashMap<String, BTreeSet<String>>,
    pub relations: Vec<RelationTable>,
}

impl ExtractStats {
    pub fn rows(&self, record_type: &str) -> u64 {
        self.rows.get(record_type).copied().unwrap_or(0)
    }

    /// Smallest identifier not used by any record type
    pub fn first_free_id(&self) -> u64 {
        self.rows.values().copied().max().unwrap_or(0)
    }
}

pub struct RecordExtractor<'a> {
    schema: &'a DiscoveredSchema,
    config: &'a MeltConfig,
    state: State,
    buffer: RecordBuffer,
    next_ids: HashMap<String, u64>,
    types: TypeObservations,
    multi_valued: HashMap<String, BTreeSet<String>>,
    relations: RelationExtractor,
}

impl<'a> RecordExtractor<'a> {
    /// Records start at depth-1 elements whose type was discovered in the first pass
    pub fn new(schema: &'a DiscoveredSchema, config: &'a MeltConfig) -> Self {
        RecordExtractor {
            schema,
            config,
            state: State::Outside,
            buffer: RecordBuffer::new(),
            next_ids: HashMap::new(),
            types: TypeObservations::new(),
            multi_valued: HashMap::new(),
            relations: RelationExtractor::new(&config.relations),
        }
    }

    /// Run a full pass over a fresh stream from `source`, writing rows to `sink`
    pub fn extract<S, K>(mut self, source: &S, sink: &mut K) -> Result<ExtractStats>
    where
        S: EventSource + ?Sized,
        K: RowSink,
    {
        for event in source.open()? {
            self.handle(event?, sink)?;
        }
        Ok(self.finish())
    }

    pub fn handle<K: RowSink>(&mut self, event: DocEvent, sink: &mut K) -> Result<()> {
        let annotate = self.config.annotates();

        match event {
            DocEvent::Open { name, attributes, depth: 1 }
                if self.state == State::Outside && self.schema.contains(&name) =>
            {
                for (key, value) in attributes {
                    if annotate {
                        self.types.observe(&name, &key, &value);
                    }
                    self.buffer.merge(&key, value);
                }
                self.state = State::InsideRecord(name);
            }
            DocEvent::Close { name, attributes, text, depth } => {
                let State::InsideRecord(record_type) = &self.state else {
                    return Ok(());
                };

                if depth == 1 && name == *record_type {
                    self.state = State::Outside;
                    return self.close_record(&name, sink);
                }

                let Some(text) = text else {
                    return Ok(());
                };

                if annotate {
                    self.types.observe(record_type, &name, &text);
                }
                self.buffer.merge(&name, text);

                for (key, value) in attributes {
                    let column = compound_column(&name, &key);
                    if annotate {
                        self.types.observe(record_type, &column, &value);
                    }
                    self.buffer.merge(&column, value);
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn close_record<K: RowSink>(&mut self, record_type: &str, sink: &mut K) -> Result<()> {
        // Records without a single populated column are dropped
        if self.buffer.is_empty() {
            return Ok(());
        }

        for column in self.buffer.multi_valued() {
            self.multi_valued
                .entry(record_type.to_string())
                .or_default()
                .insert(column.to_string());
        }

        let next = self.next_ids.entry(record_type.to_string()).or_insert(0);
        let id = *next;
        *next += 1;

        // Relations see the individual values before they are joined
        if self.relations.is_configured() {
            self.relations.record(id, &self.buffer);
        }

        self.buffer.join_multi(&self.config.multi_value_separator);
        let written = sink.write_row(record_type, id, &self.buffer);
        self.buffer.clear();
        written
    }

    pub fn finish(self) -> ExtractStats {
        let rows: BTreeMap<String, u64> = self.next_ids.into_iter().collect();
        info!(
            rows = rows.values().sum::<u64>(),
            record_types = rows.len(),
            "record extraction finished"
        );

        ExtractStats {
            rows,
            types: self.types,
            multi_valued: self.multi_valued,
            relations: self.relations.into_tables(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::melt::types::RelationSpec;
    use crate::schema::discover::SchemaDiscoverer;
    use crate::schema::inference::TypeTag;
    use crate::source::XmlSource;

    #[derive(Default)]
    struct Rows(Vec<(String, u64, BTreeMap<String, String>)>);

    impl RowSink for Rows {
        fn write_row(&mut self, record_type: &str, id: u64, row: &RecordBuffer) -> Result<()> {
            let cells = row
                .iter()
                .map(|(k, v)| (k.to_string(), v.as_scalar().unwrap().to_string()))
                .collect();
            self.0.push((record_type.to_string(), id, cells));
            Ok(())
        }
    }

    fn run(xml: &str, types: &[&str], config: &MeltConfig) -> (DiscoveredSchema, Rows, ExtractStats) {
        let source = XmlSource::from_bytes(xml);
        let schema = SchemaDiscoverer::new(types.iter().copied()).discover(&source).unwrap();
        let mut rows = Rows::default();
        let stats = RecordExtractor::new(&schema, config).extract(&source, &mut rows).unwrap();
        (schema, rows, stats)
    }

    fn cells(values: &[(&str, &str)]) -> BTreeMap<String, String> {
        values.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    const ARTICLES: &str = r#"<dblp>
        <article><title>A</title><author>X</author><author>Y</author></article>
        <article><title>B</title></article>
    </dblp>"#;

    #[test]
    fn test_articles_with_authors() {
        let config = MeltConfig {
            relations: vec![RelationSpec::new("author", "authored_by")],
            ..MeltConfig::default()
        };
        let (_, rows, stats) = run(ARTICLES, &["article"], &config);

        assert_eq!(
            rows.0,
            vec![
                ("article".to_string(), 0, cells(&[("title", "A"), ("author", "X|Y")])),
                ("article".to_string(), 1, cells(&[("title", "B")])),
            ]
        );

        let relation = &stats.relations[0];
        let offset = stats.first_free_id();
        assert_eq!(offset, 2);
        assert_eq!(relation.nodes(offset).collect::<Vec<_>>(), vec![(2, "X"), (3, "Y")]);
        assert_eq!(relation.edges(offset).collect::<Vec<_>>(), vec![(0, 2), (0, 3)]);
    }

    #[test]
    fn test_join_is_independent_of_arrival_order() {
        let xml = "<r><a><k>b</k><k>c</k><k>a</k></a><a><k>c</k><k>a</k><k>b</k></a></r>";
        let (_, rows, stats) = run(xml, &["a"], &MeltConfig::default());

        assert_eq!(rows.0[0].2["k"], "a|b|c");
        assert_eq!(rows.0[1].2["k"], "a|b|c");
        assert!(stats.multi_valued["a"].contains("k"));
    }

    #[test]
    fn test_ids_are_dense_per_type_and_skip_empty_records() {
        let xml = r#"<r>
            <article><title>1</title></article>
            <book/>
            <article/>
            <book><title>2</title></book>
            <article key="k"/>
            <article><note></note></article>
            <article><title>3</title></article>
        </r>"#;
        let (_, rows, stats) = run(xml, &["article", "book"], &MeltConfig::default());

        let ids: Vec<(&str, u64)> = rows.0.iter().map(|(t, id, _)| (t.as_str(), *id)).collect();
        assert_eq!(ids, vec![("article", 0), ("book", 0), ("article", 1), ("article", 2)]);
        assert_eq!(stats.rows("article"), 3);
        assert_eq!(stats.rows("book"), 1);
    }

    #[test]
    fn test_values_are_copied_verbatim() {
        let xml = r#"<r><article key="x; &quot;y&quot;"><ee type=" oa ">  http://a  </ee></article></r>"#;
        let (_, rows, _) = run(xml, &["article"], &MeltConfig::default());

        assert_eq!(
            rows.0[0].2,
            cells(&[("key", "x; \"y\""), ("ee", "  http://a  "), ("ee-type", " oa ")])
        );
    }

    #[test]
    fn test_whitespace_leaf_text_is_a_value() {
        let xml = "<r><article><title>A</title><note> </note></article><article><note>\t</note></article></r>";
        let (schema, rows, _) = run(xml, &["article"], &MeltConfig::default());

        assert!(schema.columns("article").unwrap().contains("note"));
        assert_eq!(rows.0[0].2, cells(&[("title", "A"), ("note", " ")]));
        assert_eq!(rows.0[1].2, cells(&[("note", "\t")]));
    }

    #[test]
    fn test_discovered_columns_cover_populated_columns() {
        let xml = r#"<dblp>
            <article key="a" mdate="2020-01-01"><author>X</author><ee type="oa">u</ee></article>
            <inproceedings key="b"><title>T<sub>2</sub></title><pages>1-2</pages></inproceedings>
            <article><cite label="l">c1</cite><cite>c2</cite><cite></cite></article>
        </dblp>"#;
        let (schema, rows, _) = run(xml, &["article", "inproceedings"], &MeltConfig::default());

        for (record_type, _, cells) in &rows.0 {
            let columns = schema.columns(record_type).unwrap();
            for column in cells.keys() {
                assert!(columns.contains(column), "{column} missing from {record_type}");
            }
        }
    }

    #[test]
    fn test_types_observed_only_when_annotating() {
        let xml = r#"<r><a n="1"><d>2021-05-01</d></a><a n="2.5"><d>2021-05-01 10:00</d></a></r>"#;

        let (_, _, plain) = run(xml, &["a"], &MeltConfig::default());
        assert!(plain.types.tags("a", "d").is_none());

        let config = MeltConfig {
            annotate_types: true,
            ..MeltConfig::default()
        };
        let (_, _, stats) = run(xml, &["a"], &config);
        assert_eq!(stats.types.reduced("a", "d").unwrap(), TypeTag::DateTime);
        assert_eq!(stats.types.reduced("a", "n").unwrap(), TypeTag::Float);
    }

    #[test]
    fn test_events_outside_records_are_ignored() {
        let xml = "<r><meta><title>not a record</title></meta><a><t>x</t></a></r>";
        let (_, rows, _) = run(xml, &["a"], &MeltConfig::default());

        assert_eq!(rows.0.len(), 1);
        assert_eq!(rows.0[0].2, cells(&[("t", "x")]));
    }
}
