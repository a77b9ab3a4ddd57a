//! IFC ingestion for bimgraph.
//!
//! IFC building models ship as STEP physical files (ISO 10303-21, "SPF").
//! This crate parses that encoding directly and lifts the entity soup into
//! the flat records the graph writer understands:
//!
//! - element records for every entity in the IfcProduct hierarchy, with
//!   flattened property sets, and
//! - relationship records for the five association kinds the importer covers
//!   (aggregation, connection, property definition, spatial containment,
//!   group assignment).
//!
//! Extraction is one pass, in ascending entity-id order, and never aborts on
//! a malformed record: bad entities are skipped with a warning and the rest
//! of the file is still recovered.

pub mod extract;
pub mod schema;
pub mod spf;

pub use extract::IfcModel;
pub use spf::{parse_spf, SpfEntity, SpfValue};
