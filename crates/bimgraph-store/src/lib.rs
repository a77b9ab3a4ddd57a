//! Graph writer for bimgraph.
//!
//! One trait, two backends. The write semantics (upsert keyed by global
//! identifier, dual element labels, per-pair edge writes with
//! at-least-one-success reporting) live in the trait's provided methods, so
//! Neo4j and FalkorDB cannot drift apart: a backend only supplies statement
//! execution, scalar/row fetching, and its own reconnect behavior.
//!
//! No error escapes as a panic; every failure comes back as a `StoreError`
//! value for the batch driver to count and log.

pub mod cypher;
pub mod falkordb;
pub mod neo4j;

use async_trait::async_trait;
use bimgraph_model::{ElementRecord, FileNode, GraphStats, RelationshipRecord};
use cypher::Statement;
use std::collections::BTreeMap;

pub use falkordb::FalkorStore;
pub use neo4j::Neo4jStore;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("write returned no result for {0}")]
    NoResult(String),
    #[error("relationship {0} has no usable endpoint pairs")]
    MissingEndpoints(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Attempts per write, including the first. Between attempts the backend
/// reconnects if the failure looked connection-related.
pub const WRITE_ATTEMPTS: usize = 2;

/// Heuristic from the underlying drivers' error texts: does this failure
/// warrant a reconnect-and-retry?
pub fn is_connection_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["connection", "reset", "refused", "timeout"]
        .iter()
        .any(|keyword| lower.contains(keyword))
}

// ============================================================================
// The store trait
// ============================================================================

/// A property-graph backend.
///
/// Implementors provide the transport; the data contract is fixed by the
/// provided methods below and the statements in [`cypher`].
#[async_trait]
pub trait GraphStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Execute a statement; report whether it returned at least one row.
    /// Backends retry once through a reconnect when the failure looks
    /// connection-related.
    async fn execute(&self, stmt: &Statement) -> StoreResult<bool>;

    /// Run a `RETURN … AS count` query and fetch the single scalar.
    async fn fetch_count(&self, query: &str) -> StoreResult<i64>;

    /// Run a `RETURN … AS type, … AS count` query and fetch the rows.
    async fn fetch_distribution(&self, query: &str) -> StoreResult<BTreeMap<String, i64>>;

    async fn close(&self);

    // ------------------------------------------------------------------
    // Shared write semantics
    // ------------------------------------------------------------------

    async fn ping(&self) -> StoreResult<()> {
        self.execute(&Statement::raw(cypher::PING)).await.map(|_| ())
    }

    /// Upsert the file metadata node; returns the derived file id.
    async fn create_file_node(&self, file: &FileNode) -> StoreResult<String> {
        let stmt = cypher::merge_file_node(file);
        match self.execute(&stmt).await? {
            true => {
                tracing::debug!(file_id = %file.file_id, "file node created/updated");
                Ok(file.file_id.clone())
            }
            false => Err(StoreError::NoResult(format!("file node {}", file.file_id))),
        }
    }

    /// Upsert an element node, optionally linked to its file node.
    async fn create_element_node(
        &self,
        rec: &ElementRecord,
        file_id: Option<&str>,
    ) -> StoreResult<()> {
        let stmt = cypher::merge_element(rec, file_id);
        match self.execute(&stmt).await? {
            true => {
                tracing::debug!(global_id = %rec.global_id, "element node created/updated");
                Ok(())
            }
            false => Err(StoreError::NoResult(format!("element {}", rec.global_id))),
        }
    }

    /// Write a relationship record as typed edges.
    ///
    /// Multi-endpoint kinds fan out into independent pair writes: the record
    /// succeeds when at least one pair landed, and a failed pair never stops
    /// its siblings. Property-definition records are a no-op because the
    /// properties already live on the element node.
    async fn create_relationship(&self, rel: &RelationshipRecord) -> StoreResult<()> {
        let Some(pairs) = endpoint_pairs(rel) else {
            return Ok(());
        };
        if pairs.is_empty() {
            return Err(StoreError::MissingEndpoints(rel.global_id().to_string()));
        }

        let edge_type = rel.edge_type();
        let rel_id = rel.global_id();
        let total = pairs.len();
        let mut created = 0usize;

        for (from_id, to_id) in pairs {
            let stmt = cypher::merge_edge(edge_type, from_id, to_id, rel_id);
            match self.execute(&stmt).await {
                Ok(true) => created += 1,
                Ok(false) => {
                    tracing::warn!(
                        edge = edge_type,
                        from = from_id,
                        to = to_id,
                        "edge skipped: endpoint not found in graph"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        edge = edge_type,
                        from = from_id,
                        to = to_id,
                        error = %err,
                        "edge write failed"
                    );
                }
            }
        }

        if created > 0 {
            tracing::debug!(edge = edge_type, created, total, "relationship written");
            Ok(())
        } else {
            Err(StoreError::NoResult(format!(
                "{edge_type} relationship {rel_id}"
            )))
        }
    }

    /// Delete every node and relationship in the graph.
    async fn clear(&self) -> StoreResult<()> {
        self.execute(&Statement::raw(cypher::CLEAR_ALL))
            .await
            .map(|_| ())
    }

    /// Collect the post-run statistics. Count queries must succeed;
    /// distributions degrade to empty on failure.
    async fn stats(&self) -> StoreResult<GraphStats> {
        let total_nodes = self.fetch_count(cypher::COUNT_NODES).await?;
        let total_relationships = self.fetch_count(cypher::COUNT_RELATIONSHIPS).await?;

        let mut label_counts = BTreeMap::new();
        for (label, query) in [
            ("Element", cypher::COUNT_ELEMENTS),
            ("IFCFile", cypher::COUNT_FILES),
        ] {
            if let Ok(count) = self.fetch_count(query).await {
                if count > 0 {
                    label_counts.insert(label.to_string(), count);
                }
            }
        }

        Ok(GraphStats {
            total_nodes,
            total_relationships,
            label_counts,
            element_types: self
                .fetch_distribution(cypher::ELEMENT_TYPE_DISTRIBUTION)
                .await
                .unwrap_or_default(),
            relationship_types: self
                .fetch_distribution(cypher::RELATIONSHIP_TYPE_DISTRIBUTION)
                .await
                .unwrap_or_default(),
        })
    }
}

/// Expand a relationship record into directed endpoint pairs.
///
/// `None` means the record does not materialize as edges at all
/// (property definitions); an empty vector means it should have endpoints
/// but does not.
fn endpoint_pairs(rel: &RelationshipRecord) -> Option<Vec<(&str, &str)>> {
    match rel {
        RelationshipRecord::Aggregates {
            relating, related, ..
        } => Some(
            related
                .iter()
                .map(|child| (relating.as_str(), child.as_str()))
                .collect(),
        ),
        RelationshipRecord::ConnectsTo {
            relating, related, ..
        } => Some(vec![(relating.as_str(), related.as_str())]),
        RelationshipRecord::HasProperty { .. } => None,
        RelationshipRecord::ContainedIn {
            related,
            relating_structure,
            ..
        } => Some(
            related
                .iter()
                .map(|member| (member.as_str(), relating_structure.as_str()))
                .collect(),
        ),
        RelationshipRecord::AssignedTo {
            related,
            relating_group,
            ..
        } => Some(
            related
                .iter()
                .map(|member| (member.as_str(), relating_group.as_str()))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_match_the_keyword_set() {
        assert!(is_connection_error("Connection reset by peer"));
        assert!(is_connection_error("connection refused (os error 111)"));
        assert!(is_connection_error("operation TIMEOUT after 30s"));
        assert!(!is_connection_error("syntax error at offset 12"));
        assert!(!is_connection_error("constraint violation"));
    }

    #[test]
    fn aggregation_fans_out_parent_to_children() {
        let rel = RelationshipRecord::Aggregates {
            global_id: "g".into(),
            relating: "parent".into(),
            related: vec!["c1".into(), "c2".into()],
        };
        assert_eq!(
            endpoint_pairs(&rel),
            Some(vec![("parent", "c1"), ("parent", "c2")])
        );
    }

    #[test]
    fn containment_points_members_at_the_structure() {
        let rel = RelationshipRecord::ContainedIn {
            global_id: "g".into(),
            related: vec!["e1".into(), "e2".into()],
            relating_structure: "storey".into(),
        };
        assert_eq!(
            endpoint_pairs(&rel),
            Some(vec![("e1", "storey"), ("e2", "storey")])
        );
    }

    #[test]
    fn property_definitions_do_not_materialize() {
        let rel = RelationshipRecord::HasProperty {
            global_id: "g".into(),
            related: vec!["e1".into()],
            relating_definition: "pset".into(),
        };
        assert_eq!(endpoint_pairs(&rel), None);
    }

    #[test]
    fn empty_related_list_yields_no_pairs() {
        let rel = RelationshipRecord::AssignedTo {
            global_id: "g".into(),
            related: vec![],
            relating_group: "grp".into(),
        };
        assert_eq!(endpoint_pairs(&rel), Some(vec![]));
    }
}
