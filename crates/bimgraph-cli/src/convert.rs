//! Batch conversion driver.
//!
//! Walks a directory of `.ifc` files and pushes each through the
//! parse → extract → write pipeline against one shared store connection.
//! A file's failure never stops the run; the per-file outcome map is the
//! run's result, and the process exit code is derived from it at the end.

use anyhow::Result;
use bimgraph_ingest_ifc::IfcModel;
use bimgraph_model::{FileNode, GraphStats};
use bimgraph_store::GraphStore;
use colored::Colorize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-file outcome of a batch run.
pub type BatchResults = BTreeMap<PathBuf, bool>;

/// List the `.ifc` files of a directory, sorted for a deterministic run
/// order. Not recursive.
pub fn discover_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("ifc"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Derive the process exit code from the outcome map: any success (or an
/// empty run) is 0, a run where every file failed is 1.
pub fn exit_code(results: &BatchResults) -> i32 {
    if results.is_empty() {
        return 0;
    }
    let succeeded = results.values().filter(|ok| **ok).count();
    if succeeded > 0 {
        0
    } else {
        1
    }
}

pub struct Converter {
    store: Box<dyn GraphStore>,
}

impl Converter {
    pub fn new(store: Box<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    /// Convert one file: file node, parse, elements, relationships.
    ///
    /// Returns whether the file counts as imported. Individual element or
    /// relationship write failures are logged and do not fail the file;
    /// a parse failure or an empty extraction does.
    pub async fn convert_file(&self, path: &Path) -> bool {
        tracing::info!(file = %path.display(), "starting conversion");

        let file_node = match FileNode::from_path(path) {
            Ok(node) => node,
            Err(err) => {
                tracing::error!(file = %path.display(), error = %err, "cannot stat file");
                return false;
            }
        };
        let file_id = match self.store.create_file_node(&file_node).await {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(file = %path.display(), error = %err, "file node creation failed");
                return false;
            }
        };

        let model = match IfcModel::open(path) {
            Ok(model) => model,
            Err(err) => {
                tracing::error!(file = %path.display(), error = %err, "parse failed");
                return false;
            }
        };

        let elements = model.extract_elements();
        if elements.is_empty() {
            tracing::warn!(file = %path.display(), "no elements extracted");
            return false;
        }

        let mut written = 0usize;
        for element in &elements {
            match self
                .store
                .create_element_node(element, Some(&file_id))
                .await
            {
                Ok(()) => written += 1,
                Err(err) => {
                    tracing::warn!(
                        global_id = %element.global_id,
                        error = %err,
                        "element write failed"
                    );
                }
            }
        }
        tracing::info!(written, total = elements.len(), "element nodes written");

        let relationships = model.extract_relationships();
        if relationships.is_empty() {
            tracing::info!("no relationships extracted");
        } else {
            let mut created = 0usize;
            for relationship in &relationships {
                match self.store.create_relationship(relationship).await {
                    Ok(()) => created += 1,
                    Err(err) => {
                        tracing::warn!(
                            global_id = relationship.global_id(),
                            error = %err,
                            "relationship write failed"
                        );
                    }
                }
            }
            tracing::info!(
                created,
                total = relationships.len(),
                "relationships written"
            );
        }

        tracing::info!(file = %path.display(), "conversion completed");
        true
    }

    /// Convert files in order, stopping early only on interruption.
    pub async fn convert_files(&self, files: &[PathBuf], interrupted: &AtomicBool) -> BatchResults {
        let mut results = BatchResults::new();

        for path in files {
            if interrupted.load(Ordering::SeqCst) {
                tracing::warn!("run interrupted, skipping remaining files");
                break;
            }
            let ok = self.convert_file(path).await;
            if ok {
                tracing::info!(file = %path.display(), "conversion successful");
            } else {
                tracing::error!(file = %path.display(), "conversion failed");
            }
            results.insert(path.clone(), ok);
        }

        let succeeded = results.values().filter(|ok| **ok).count();
        tracing::info!(succeeded, total = results.len(), "batch completed");
        results
    }

    /// Re-extract one file and compare its counts against the stored totals.
    /// Extracted counts can only be a lower bound: the graph may hold other
    /// files too.
    pub async fn validate_file(&self, path: &Path) -> Result<ValidationReport> {
        let model = IfcModel::open(path)?;
        let extracted_elements = model.extract_elements().len();
        let extracted_relationships = model.extract_relationships().len();
        let stats = self.store.stats().await?;

        Ok(ValidationReport {
            extracted_elements,
            extracted_relationships,
            stored_nodes: stats.total_nodes,
            stored_relationships: stats.total_relationships,
        })
    }
}

/// Counts compared by `--validate`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub extracted_elements: usize,
    pub extracted_relationships: usize,
    pub stored_nodes: i64,
    pub stored_relationships: i64,
}

impl ValidationReport {
    pub fn elements_match(&self) -> bool {
        self.extracted_elements as i64 <= self.stored_nodes
    }

    pub fn relationships_match(&self) -> bool {
        self.extracted_relationships as i64 <= self.stored_relationships
    }
}

// ============================================================================
// Terminal reporting
// ============================================================================

pub fn print_summary(results: &BatchResults, stats: Option<&GraphStats>) {
    let total = results.len();
    let succeeded = results.values().filter(|ok| **ok).count();
    let failed = total - succeeded;

    println!();
    println!("{}", "Conversion result summary".bold());
    println!("  Total files: {total}");
    println!("  Successful:  {}", succeeded.to_string().green());
    println!("  Failed:      {}", failed.to_string().red());
    if total > 0 {
        println!(
            "  Success rate: {:.1}%",
            succeeded as f64 / total as f64 * 100.0
        );
    }

    let failed_files: Vec<&PathBuf> = results
        .iter()
        .filter(|(_, ok)| !**ok)
        .map(|(path, _)| path)
        .collect();
    if !failed_files.is_empty() {
        println!("\n{}", "Failed files:".red().bold());
        for path in failed_files {
            println!(
                "  {}",
                path.file_name()
                    .map(|n| n.to_string_lossy())
                    .unwrap_or_else(|| path.to_string_lossy())
            );
        }
    }

    if let Some(stats) = stats {
        print_stats(stats);
    }
}

pub fn print_stats(stats: &GraphStats) {
    println!("\n{}", "Database statistics".bold());
    println!("  Nodes:         {}", stats.total_nodes);
    println!("  Relationships: {}", stats.total_relationships);
    for (label, count) in &stats.label_counts {
        println!("  {label}: {count}");
    }

    if !stats.element_types.is_empty() {
        let mut types: Vec<(&String, &i64)> = stats.element_types.iter().collect();
        types.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        println!("\n  Element type distribution (top 5):");
        for (rank, (class, count)) in types.iter().take(5).enumerate() {
            println!("    {}. {class}: {count}", rank + 1);
        }
    }

    if !stats.relationship_types.is_empty() {
        println!("\n  Relationship type distribution:");
        for (edge_type, count) in &stats.relationship_types {
            println!("    {edge_type}: {count}");
        }
    }
}

pub fn print_validation(report: &ValidationReport) {
    println!("\n{}", "Validation results".bold());
    println!("  Extracted elements:      {}", report.extracted_elements);
    println!(
        "  Extracted relationships: {}",
        report.extracted_relationships
    );
    println!("  Stored nodes:            {}", report.stored_nodes);
    println!("  Stored relationships:    {}", report.stored_relationships);
    println!(
        "  Elements match:      {}",
        if report.elements_match() {
            "yes".green()
        } else {
            "no".red()
        }
    );
    println!(
        "  Relationships match: {}",
        if report.relationships_match() {
            "yes".green()
        } else {
            "no".red()
        }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_reflects_the_outcome_ratio() {
        let mut results = BatchResults::new();
        assert_eq!(exit_code(&results), 0, "empty run is not a failure");

        results.insert(PathBuf::from("a.ifc"), true);
        results.insert(PathBuf::from("b.ifc"), true);
        assert_eq!(exit_code(&results), 0, "all succeeded");

        results.insert(PathBuf::from("c.ifc"), false);
        assert_eq!(exit_code(&results), 0, "partial success is still success");

        let all_failed: BatchResults = [
            (PathBuf::from("a.ifc"), false),
            (PathBuf::from("b.ifc"), false),
        ]
        .into_iter()
        .collect();
        assert_eq!(exit_code(&all_failed), 1, "total failure");
    }

    #[test]
    fn discover_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.ifc"), "x").unwrap();
        std::fs::write(dir.path().join("a.ifc"), "x").unwrap();
        std::fs::write(dir.path().join("C.IFC"), "x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub.ifc")).unwrap();

        let files = discover_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["C.IFC", "a.ifc", "b.ifc"]);
    }

    #[test]
    fn discover_files_empty_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn validation_compares_as_lower_bounds() {
        let report = ValidationReport {
            extracted_elements: 10,
            extracted_relationships: 4,
            stored_nodes: 11,
            stored_relationships: 4,
        };
        assert!(report.elements_match());
        assert!(report.relationships_match());

        let report = ValidationReport {
            stored_nodes: 9,
            ..report
        };
        assert!(!report.elements_match());
    }
}
