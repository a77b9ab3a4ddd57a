//! Library surface of the bimgraph CLI: configuration loading and the batch
//! conversion driver, kept out of `main.rs` so the driver is testable
//! against mock stores.

pub mod config;
pub mod convert;
