use crate::error::{ConvertError, Result};
use crate::melt::layout::OutputLayout;
use crate::melt::types::{MeltConfig, RecordBuffer};
use crate::schema::discover::{DiscoveredSchema, ID_COLUMN};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use tracing::debug;

/// Destination for the rows produced by the record extractor
pub trait RowSink {
    /// Write one closed record. Multi-valued cells have already been joined.
    fn write_row(&mut self, record_type: &str, id: u64, row: &RecordBuffer) -> Result<()>;
}

struct Table<W: Write> {
    columns: Vec<String>,
    writer: csv::Writer<W>,
}

/// Writes rows to one delimited table per record type
pub struct TableWriter<W: Write> {
    tables: HashMap<String, Table<W>>,
}

impl TableWriter<File> {
    /// Open one table file per discovered record type.
    ///
    /// The plain header is written inline unless types are annotated, in
    /// which case the header goes to a sibling file once types are known.
    pub fn create(schema: &DiscoveredSchema, layout: &OutputLayout, config: &MeltConfig) -> Result<Self> {
        layout.ensure_dir()?;
        let mut writer = TableWriter::new();

        for record_type in schema.record_types() {
            let Some(columns) = schema.columns(record_type) else {
                continue;
            };
            let path = layout.table_path(record_type);
            let file = File::create(&path).map_err(|e| ConvertError::io(&path, e))?;
            debug!(record_type, path = %path.display(), columns = columns.len(), "opened table");
            writer.add_table(
                record_type,
                columns.iter().cloned().collect(),
                file,
                config,
            )?;
        }

        Ok(writer)
    }
}

impl<W: Write> TableWriter<W> {
    pub fn new() -> Self {
        TableWriter {
            tables: HashMap::new(),
        }
    }

    /// Register a table backed by `out`, with `columns` sorted and excluding `id`
    pub fn add_table(
        &mut self,
        record_type: &str,
        columns: Vec<String>,
        out: W,
        config: &MeltConfig,
    ) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(config.delimiter)
            .has_headers(false)
            .from_writer(out);

        if !config.annotates() {
            writer.write_record(plain_header(&columns))?;
        }

        self.tables.insert(record_type.to_string(), Table { columns, writer });
        Ok(())
    }

    /// Flush all tables
    pub fn flush(&mut self) -> Result<()> {
        for table in self.tables.values_mut() {
            table.writer.flush().map_err(|e| ConvertError::Csv(e.into()))?;
        }
        Ok(())
    }

    /// Flush and hand back the underlying writers
    pub fn into_inner(self) -> Result<HashMap<String, W>> {
        let mut out = HashMap::new();
        for (record_type, table) in self.tables {
            let inner = table
                .writer
                .into_inner()
                .map_err(|e| ConvertError::Csv(e.into_error().into()))?;
            out.insert(record_type, inner);
        }
        Ok(out)
    }
}

impl<W: Write> Default for TableWriter<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> RowSink for TableWriter<W> {
    fn write_row(&mut self, record_type: &str, id: u64, row: &RecordBuffer) -> Result<()> {
        let table = self.tables.get_mut(record_type).ok_or_else(|| {
            ConvertError::Internal(format!("no table was opened for record type {:?}", record_type))
        })?;

        let id = id.to_string();
        let mut record: Vec<&str> = Vec::with_capacity(table.columns.len() + 1);
        record.push(&id);

        let mut matched = 0;
        for column in &table.columns {
            match row.get(column) {
                Some(cell) => {
                    matched += 1;
                    record.push(cell.as_scalar().unwrap_or_default());
                }
                None => record.push(""),
            }
        }

        // Every populated column must have been discovered in the first pass
        if matched != row.len() {
            let unknown: Vec<&str> = row
                .iter()
                .map(|(column, _)| column)
                .filter(|column| !table.columns.iter().any(|c| c.as_str() == *column))
                .collect();
            return Err(ConvertError::Internal(format!(
                "record of type {:?} has undiscovered columns {:?}",
                record_type, unknown
            )));
        }

        table.writer.write_record(&record)?;
        Ok(())
    }
}

/// `id` followed by the sorted columns
pub fn plain_header(columns: &[String]) -> Vec<&str> {
    std::iter::once(ID_COLUMN)
        .chain(columns.iter().map(String::as_str))
        .collect()
}
