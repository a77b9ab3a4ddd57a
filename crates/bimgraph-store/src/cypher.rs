//! Cypher statement construction.
//!
//! Both backends execute the statements built here, which is what keeps
//! their data contracts identical: the Neo4j driver binds the parameters
//! natively, the FalkorDB backend renders them as literals into a `CYPHER`
//! parameter prefix. Labels and relationship types cannot be parameterized
//! in Cypher, so they are interpolated. They get validated first, since element
//! class names ultimately come from file content.

use bimgraph_model::{ElementRecord, FileNode};
use std::fmt::Write as _;

// ============================================================================
// Parameter values
// ============================================================================

/// A parameter value bound into a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum CypherValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&str> for CypherValue {
    fn from(v: &str) -> Self {
        CypherValue::Str(v.to_string())
    }
}

impl From<String> for CypherValue {
    fn from(v: String) -> Self {
        CypherValue::Str(v)
    }
}

impl From<i64> for CypherValue {
    fn from(v: i64) -> Self {
        CypherValue::Int(v)
    }
}

impl From<bool> for CypherValue {
    fn from(v: bool) -> Self {
        CypherValue::Bool(v)
    }
}

impl CypherValue {
    /// Render as a Cypher literal (used by the FalkorDB parameter prefix).
    pub fn to_literal(&self) -> String {
        match self {
            CypherValue::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            CypherValue::Int(n) => n.to_string(),
            CypherValue::Float(f) => {
                let s = f.to_string();
                if s.contains('.') || s.contains('e') || s.contains('E') {
                    s
                } else {
                    format!("{s}.0")
                }
            }
            CypherValue::Str(s) => format!("'{}'", escape_string(s)),
        }
    }
}

/// Backslash-escape a string for embedding in a single-quoted Cypher
/// literal. NUL bytes are dropped outright.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Labels and relationship types are interpolated into query text; restrict
/// them to identifier characters.
pub fn valid_label(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// Statements
// ============================================================================

/// Query text plus named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<(&'static str, CypherValue)>,
}

impl Statement {
    /// A statement with no parameters.
    pub fn raw(text: &str) -> Self {
        Self {
            text: text.to_string(),
            params: Vec::new(),
        }
    }
}

/// Upsert the file metadata node, keyed on the derived file id.
pub fn merge_file_node(file: &FileNode) -> Statement {
    let text = "MERGE (f:IFCFile {fileId: $fileId})\n\
                SET f.fileName = $fileName,\n\
                    f.filePath = $filePath,\n\
                    f.fileSize = $fileSize,\n\
                    f.createdDate = $createdDate,\n\
                    f.modifiedDate = $modifiedDate,\n\
                    f.importDate = $importDate\n\
                RETURN f.fileId AS fileId"
        .to_string();

    Statement {
        text,
        params: vec![
            ("fileId", file.file_id.as_str().into()),
            ("fileName", file.file_name.as_str().into()),
            ("filePath", file.file_path.as_str().into()),
            ("fileSize", (file.file_size as i64).into()),
            ("createdDate", file.created_date.as_str().into()),
            ("modifiedDate", file.modified_date.as_str().into()),
            ("importDate", file.import_date.as_str().into()),
        ],
    }
}

/// Upsert an element node, keyed on its GlobalId.
///
/// The node carries the generic `Element` label plus the element's specific
/// class label. With a file id, the element is also linked to its file node
/// via `BELONGS_TO_FILE`.
pub fn merge_element(rec: &ElementRecord, file_id: Option<&str>) -> Statement {
    // Class names come from the static schema table, but the table is the
    // extractor's business, not ours: fall back to the generic label alone
    // rather than interpolating something unvetted.
    let mut labels = String::from(":Element");
    if valid_label(&rec.ifc_class) {
        let _ = write!(labels, ":{}", rec.ifc_class);
    } else {
        tracing::warn!(class = %rec.ifc_class, "invalid class label dropped");
    }

    let mut text = format!(
        "MERGE (e{labels} {{globalId: $globalId}})\n\
         SET e.name = $name,\n\
             e.ifcClass = $ifcClass,\n\
             e.description = $description,\n\
             e.objectType = $objectType,\n\
             e.tag = $tag"
    );

    let mut params: Vec<(&'static str, CypherValue)> = vec![
        ("globalId", rec.global_id.as_str().into()),
        ("name", rec.name.as_str().into()),
        ("ifcClass", rec.ifc_class.as_str().into()),
        ("description", rec.description.as_str().into()),
        ("objectType", rec.object_type.as_str().into()),
        ("tag", rec.tag.as_str().into()),
    ];

    if let Some(json) = rec.properties_json() {
        text.push_str(",\n    e.properties = $properties");
        params.push(("properties", json.into()));
    }

    if let Some(file_id) = file_id {
        text.push_str(",\n    e.sourceFileId = $sourceFileId");
        params.push(("sourceFileId", file_id.into()));
        text.push_str(
            "\nWITH e\n\
             MATCH (f:IFCFile {fileId: $fileId})\n\
             MERGE (e)-[:BELONGS_TO_FILE]->(f)",
        );
        params.push(("fileId", file_id.into()));
    }

    text.push_str("\nRETURN e.globalId AS globalId");

    Statement { text, params }
}

/// Upsert one typed edge between two elements, stamped with the originating
/// relationship's GlobalId. Both endpoints must already exist: `MATCH`, not
/// `MERGE`, so a missing endpoint yields no row rather than a phantom node.
pub fn merge_edge(edge_type: &str, from_id: &str, to_id: &str, rel_id: &str) -> Statement {
    debug_assert!(valid_label(edge_type), "edge type from a fixed set");

    let text = format!(
        "MATCH (from:Element {{globalId: $fromId}})\n\
         MATCH (to:Element {{globalId: $toId}})\n\
         MERGE (from)-[r:{edge_type}]->(to)\n\
         SET r.globalId = $relId\n\
         RETURN r.globalId AS relId"
    );

    Statement {
        text,
        params: vec![
            ("fromId", from_id.into()),
            ("toId", to_id.into()),
            ("relId", rel_id.into()),
        ],
    }
}

// Fixed queries shared by both backends.
pub const PING: &str = "RETURN 1";
pub const CLEAR_ALL: &str = "MATCH (n) DETACH DELETE n";
pub const COUNT_NODES: &str = "MATCH (n) RETURN count(n) AS count";
pub const COUNT_RELATIONSHIPS: &str = "MATCH ()-[r]->() RETURN count(r) AS count";
pub const COUNT_ELEMENTS: &str = "MATCH (n:Element) RETURN count(n) AS count";
pub const COUNT_FILES: &str = "MATCH (n:IFCFile) RETURN count(n) AS count";
pub const ELEMENT_TYPE_DISTRIBUTION: &str =
    "MATCH (n:Element) RETURN n.ifcClass AS type, count(n) AS count ORDER BY count DESC";
pub const RELATIONSHIP_TYPE_DISTRIBUTION: &str =
    "MATCH ()-[r]->() RETURN type(r) AS type, count(r) AS count ORDER BY count DESC";
