//! Shared record vocabulary for the bimgraph pipeline.
//!
//! The extractor (`bimgraph-ingest-ifc`) produces these records; the graph
//! writer (`bimgraph-store`) consumes them. Nothing here touches a parser or
//! a database: plain data, serializable, stable across backends.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

// ============================================================================
// Property values
// ============================================================================

/// Scalar value of a single property inside a property set.
///
/// IFC wraps primitives in typed shells (`IFCLABEL('x')`, `IFCREAL(2.5)`);
/// extraction unwraps them down to this union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Real(f64),
    Bool(bool),
}

/// Property-set-name → (property-name → value).
pub type PropertySets = BTreeMap<String, BTreeMap<String, PropertyValue>>;

// ============================================================================
// Entity records
// ============================================================================

/// One extracted building element.
///
/// `global_id` is the IFC GlobalId: unique within one source file and stable
/// across repeated imports of that file, which is what makes upserts converge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub global_id: String,
    /// Canonical IFC class name, e.g. `IfcWallStandardCase`. Doubles as the
    /// element's specific node label.
    pub ifc_class: String,
    pub name: String,
    pub description: String,
    pub object_type: String,
    pub tag: String,
    pub property_sets: PropertySets,
}

impl ElementRecord {
    /// Property sets rendered as a JSON string, the shape they are persisted
    /// in on the node. `None` when the element carries no properties.
    pub fn properties_json(&self) -> Option<String> {
        if self.property_sets.is_empty() {
            return None;
        }
        serde_json::to_string(&self.property_sets).ok()
    }
}

// ============================================================================
// Relationship records
// ============================================================================

/// One extracted typed association between elements.
///
/// Five kinds, mirroring the IFC relationship entities the importer covers.
/// Endpoints are GlobalId strings; there is no payload beyond the record's
/// own identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelationshipRecord {
    /// One parent decomposed into many children (`IfcRelAggregates`).
    Aggregates {
        global_id: String,
        relating: String,
        related: Vec<String>,
    },
    /// Element-to-element connection (`IfcRelConnectsElements`).
    ConnectsTo {
        global_id: String,
        relating: String,
        related: String,
    },
    /// Elements described by a property definition
    /// (`IfcRelDefinesByProperties`). A no-op at the write layer: properties
    /// are embedded in the element node.
    HasProperty {
        global_id: String,
        related: Vec<String>,
        relating_definition: String,
    },
    /// Elements contained in a spatial structure
    /// (`IfcRelContainedInSpatialStructure`).
    ContainedIn {
        global_id: String,
        related: Vec<String>,
        relating_structure: String,
    },
    /// Elements assigned to a group (`IfcRelAssignsToGroup`).
    AssignedTo {
        global_id: String,
        related: Vec<String>,
        relating_group: String,
    },
}

impl RelationshipRecord {
    /// Edge type this record materializes as in the graph.
    pub fn edge_type(&self) -> &'static str {
        match self {
            Self::Aggregates { .. } => "AGGREGATES",
            Self::ConnectsTo { .. } => "CONNECTS_TO",
            Self::HasProperty { .. } => "HAS_PROPERTY",
            Self::ContainedIn { .. } => "CONTAINED_IN",
            Self::AssignedTo { .. } => "ASSIGNED_TO",
        }
    }

    /// GlobalId of the relationship entity itself (stamped on edges for
    /// traceability).
    pub fn global_id(&self) -> &str {
        match self {
            Self::Aggregates { global_id, .. }
            | Self::ConnectsTo { global_id, .. }
            | Self::HasProperty { global_id, .. }
            | Self::ContainedIn { global_id, .. }
            | Self::AssignedTo { global_id, .. } => global_id,
        }
    }
}

// ============================================================================
// File metadata
// ============================================================================

/// Metadata node for one imported source file.
///
/// `file_id` is derived from the file stem and modification time, so
/// re-importing an unchanged file converges onto the same node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    pub file_id: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub created_date: String,
    pub modified_date: String,
    pub import_date: String,
}

impl FileNode {
    /// Build a file node from filesystem metadata.
    ///
    /// Creation time falls back to modification time on filesystems that do
    /// not record it.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let modified = meta.modified()?;
        let created = meta.created().unwrap_or(modified);

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());
        let mtime_secs = DateTime::<Utc>::from(modified).timestamp();

        let absolute = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        Ok(Self {
            file_id: format!("FILE_{stem}_{mtime_secs}"),
            file_name: path
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| stem.clone()),
            file_path: absolute.display().to_string(),
            file_size: meta.len(),
            created_date: DateTime::<Local>::from(created).to_rfc3339(),
            modified_date: DateTime::<Local>::from(modified).to_rfc3339(),
            import_date: Local::now().to_rfc3339(),
        })
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Post-run counts reported by a graph backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: i64,
    pub total_relationships: i64,
    /// Counts for the labels the importer manages (`Element`, `IFCFile`).
    pub label_counts: BTreeMap<String, i64>,
    /// Element count per specific IFC class.
    pub element_types: BTreeMap<String, i64>,
    /// Edge count per relationship type.
    pub relationship_types: BTreeMap<String, i64>,
}
