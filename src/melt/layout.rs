//! Output layout: file naming, headers, relation tables and the
//! graph-store bulk-import command

use crate::error::{ConvertError, Result};
use crate::melt::relations::RelationTable;
use crate::melt::types::{MeltConfig, RelationSpec};
use crate::schema::discover::{DiscoveredSchema, ID_COLUMN};
use crate::schema::inference::{TypeObservations, TypeTag};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the generated import command
pub const IMPORT_SCRIPT: &str = "neo4j_import.sh";

/// Fixed header of every edge table
pub const EDGE_HEADER: [&str; 2] = [":START_ID", ":END_ID"];

/// Derives every output path from the user supplied output file name.
///
/// `out/dblp.csv` yields tables such as `out/dblp_article.csv`, and relation
/// files such as `out/dblp_author_nodes.csv` and `out/dblp_authored_by_edges.csv`.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    dir: PathBuf,
    stem: String,
    extension: String,
}

impl OutputLayout {
    pub fn new(output: impl AsRef<Path>) -> Self {
        let output = output.as_ref();
        let dir = output
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let extension = output
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "csv".to_string());

        OutputLayout { dir, stem, extension }
    }

    pub fn ensure_dir(&self) -> Result<()> {
        if self.dir.as_os_str().is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| ConvertError::io(&self.dir, e))
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.{}", self.stem, suffix, self.extension))
    }

    pub fn table_path(&self, record_type: &str) -> PathBuf {
        self.file(record_type)
    }

    pub fn header_path(&self, record_type: &str) -> PathBuf {
        self.file(&format!("{}_header", record_type))
    }

    pub fn nodes_path(&self, relation: &RelationSpec) -> PathBuf {
        self.file(&format!("{}_nodes", relation.field))
    }

    pub fn edges_path(&self, relation: &RelationSpec) -> PathBuf {
        self.file(&format!("{}_edges", relation.relation))
    }

    pub fn import_script_path(&self) -> PathBuf {
        self.dir.join(IMPORT_SCRIPT)
    }

    /// Every file a run with this schema and these relations may create
    pub fn planned_paths(&self, schema: &DiscoveredSchema, relations: &[RelationSpec]) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for record_type in schema.record_types() {
            paths.push(self.table_path(record_type));
            paths.push(self.header_path(record_type));
        }
        for relation in relations {
            paths.push(self.nodes_path(relation));
            paths.push(self.edges_path(relation));
        }
        paths.push(self.import_script_path());
        paths
    }
}

/// Fail if two planned outputs share a path, since the later one would
/// silently replace the earlier
pub fn ensure_distinct(paths: &[PathBuf]) -> Result<()> {
    let mut seen = HashSet::with_capacity(paths.len());
    for path in paths {
        if !seen.insert(path) {
            return Err(ConvertError::OutputCollision { path: path.clone() });
        }
    }
    Ok(())
}

/// Type name as it appears in an annotated header
pub fn type_name(tag: TypeTag, config: &MeltConfig) -> &'static str {
    match tag {
        TypeTag::Integer if config.graph_store => "int",
        other => other.as_str(),
    }
}

/// Tokens of a type-annotated header: the identifier column first, then
/// `column:type`, with `[]` appended for columns that held multiple values
pub fn annotated_header(
    record_type: &str,
    columns: &BTreeSet<String>,
    types: &TypeObservations,
    multi_valued: Option<&BTreeSet<String>>,
    config: &MeltConfig,
) -> Result<Vec<String>> {
    let mut tokens = Vec::with_capacity(columns.len() + 1);
    if config.graph_store {
        tokens.push(format!("{}:ID", record_type));
    } else {
        tokens.push(format!("{}:{}", ID_COLUMN, type_name(TypeTag::Integer, config)));
    }

    for column in columns {
        let tag = types.reduced(record_type, column)?;
        let array = multi_valued.is_some_and(|m| m.contains(column));
        tokens.push(format!(
            "{}:{}{}",
            column,
            type_name(tag, config),
            if array { "[]" } else { "" }
        ));
    }

    Ok(tokens)
}

fn delimited_writer(path: &Path, config: &MeltConfig) -> Result<csv::Writer<File>> {
    let file = File::create(path).map_err(|e| ConvertError::io(path, e))?;
    Ok(csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(false)
        .from_writer(file))
}

/// Write a single-line header file
pub fn write_header_file(path: &Path, tokens: &[String], config: &MeltConfig) -> Result<()> {
    let mut writer = delimited_writer(path, config)?;
    writer.write_record(tokens)?;
    writer.flush().map_err(|e| ConvertError::io(path, e))?;
    Ok(())
}

/// Write the annotated header file of every discovered record type
pub fn write_annotated_headers(
    schema: &DiscoveredSchema,
    layout: &OutputLayout,
    types: &TypeObservations,
    multi_valued: &HashMap<String, BTreeSet<String>>,
    config: &MeltConfig,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for record_type in schema.record_types() {
        let Some(columns) = schema.columns(record_type) else {
            continue;
        };
        let tokens = annotated_header(
            record_type,
            columns,
            types,
            multi_valued.get(record_type),
            config,
        )?;
        let path = layout.header_path(record_type);
        write_header_file(&path, &tokens, config)?;
        debug!(record_type, path = %path.display(), "wrote annotated header");
        written.push(path);
    }
    Ok(written)
}

/// Files written for one relation
#[derive(Debug, Clone)]
pub struct RelationFiles {
    pub nodes: PathBuf,
    pub edges: PathBuf,
    /// First node id of this relation
    pub offset: u64,
}

/// Write node and edge tables for every relation.
///
/// Node ids continue after `first_free_id`, relation after relation, so they
/// never collide with record identifiers.
pub fn write_relations(
    relations: &[RelationTable],
    first_free_id: u64,
    layout: &OutputLayout,
    config: &MeltConfig,
) -> Result<Vec<RelationFiles>> {
    let node_header: [&str; 2] = if config.graph_store {
        [":ID", "value"]
    } else {
        [ID_COLUMN, "value"]
    };

    let mut offset = first_free_id;
    let mut written = Vec::with_capacity(relations.len());

    for relation in relations {
        let nodes_path = layout.nodes_path(&relation.spec);
        let mut nodes = delimited_writer(&nodes_path, config)?;
        nodes.write_record(node_header)?;
        for (id, value) in relation.nodes(offset) {
            nodes.write_record([id.to_string().as_str(), value])?;
        }
        nodes.flush().map_err(|e| ConvertError::io(&nodes_path, e))?;

        let edges_path = layout.edges_path(&relation.spec);
        let mut edges = delimited_writer(&edges_path, config)?;
        edges.write_record(EDGE_HEADER)?;
        for (owner, node) in relation.edges(offset) {
            edges.write_record([owner.to_string(), node.to_string()])?;
        }
        edges.flush().map_err(|e| ConvertError::io(&edges_path, e))?;

        debug!(
            field = %relation.spec.field,
            relation = %relation.spec.relation,
            nodes = relation.node_count(),
            edges = relation.edge_count(),
            "wrote relation"
        );

        written.push(RelationFiles {
            nodes: nodes_path,
            edges: edges_path,
            offset,
        });
        offset += relation.node_count() as u64;
    }

    Ok(written)
}

/// Build the bulk-import command referencing every table and relation
pub fn import_command(
    schema: &DiscoveredSchema,
    layout: &OutputLayout,
    relations: &[RelationTable],
    files: &[RelationFiles],
    config: &MeltConfig,
) -> String {
    let mut parts = vec![
        "neo4j-admin import".to_string(),
        "--mode=csv".to_string(),
        format!("--database={}", config.database),
        format!("--delimiter=\"{}\"", char::from(config.delimiter)),
        format!("--array-delimiter=\"{}\"", config.multi_value_separator),
        "--id-type=INTEGER".to_string(),
    ];

    for record_type in schema.record_types() {
        parts.push(format!(
            "--nodes:{} \"{},{}\"",
            record_type,
            layout.header_path(record_type).display(),
            layout.table_path(record_type).display()
        ));
    }

    for (relation, files) in relations.iter().zip(files) {
        parts.push(format!("--nodes:{} \"{}\"", relation.spec.field, files.nodes.display()));
        parts.push(format!(
            "--relationships:{} \"{}\"",
            relation.spec.relation,
            files.edges.display()
        ));
    }

    parts.join(" ")
}

/// Write the import command to its script file
pub fn write_import_script(layout: &OutputLayout, command: &str) -> Result<PathBuf> {
    let path = layout.import_script_path();
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", command))
        .map_err(|e| ConvertError::io(&path, e))?;
    Ok(path)
}
