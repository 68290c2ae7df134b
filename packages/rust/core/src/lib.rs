//! Import and export orchestration for ContentBridge.
//!
//! This crate sequences the dom, render and asset passes into the two
//! end-to-end workflows: [`Importer`] (external HTML → host record) and
//! [`Exporter`] (host record → flat HTML for the external service).

pub mod export;
pub mod oplog;
pub mod pipeline;
pub mod sanitize;
pub mod seo;

pub use export::{ExportedRecord, Exporter};
pub use pipeline::{ImportOutput, ImportRequest, Importer, ProgressReporter, SilentProgress};
