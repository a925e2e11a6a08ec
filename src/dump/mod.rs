//! Traversal and export engine
//!
//! - [`sanitize`]: namespace and class identifiers to path segments
//! - [`cache`]: per-namespace instance fetch outcomes
//! - [`output`]: directory layout and file writes
//! - [`exporter`]: the namespace / class / instance walk

pub mod cache;
pub mod exporter;
pub mod output;
pub mod sanitize;

pub use cache::InstanceCache;
pub use exporter::{DumpProgress, DumpResult, DumpStats, Exporter, NamespaceScope};
pub use output::OutputTree;
pub use sanitize::{is_path_segment, sanitize};
