//! WBEM service access
//!
//! The exporter only sees the [`WbemSession`] trait. [`CimXmlClient`] is
//! the production implementation speaking CIM-XML over HTTP(S); tests
//! substitute an in-memory session.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Exporter                         │
//! │  namespaces → classes → instances (sequential)       │
//! └──────────────────────────┬──────────────────────────┘
//!                            │ WbemSession
//!                            ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                   CimXmlClient                       │
//! │  - IMETHODCALL request per operation                 │
//! │  - per-call timeout, no retries                      │
//! │  - errors tagged with ErrorKind                      │
//! └──────────────────────────┬──────────────────────────┘
//!                            │ HTTP POST (reqwest, blocking)
//!                            ▼
//!                   ┌──────────────────┐
//!                   │   CIM server     │
//!                   └──────────────────┘
//! ```

mod client;
pub mod types;
pub mod xml;

pub use client::{CimXmlClient, CimXmlClientBuilder};
pub use types::{ClassDefinition, Instance, InstancePath, KeyBinding, KeyValue, QualifierDecl};

use crate::error::WbemResult;
use std::time::Duration;

/// Flags for `GetClass`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassFlags {
    pub local_only: bool,
    pub include_qualifiers: bool,
    pub include_class_origin: bool,
}

impl ClassFlags {
    /// Full definition: inherited members, qualifiers and class origin
    pub fn full() -> Self {
        Self {
            local_only: false,
            include_qualifiers: true,
            include_class_origin: true,
        }
    }
}

/// Flags for `GetInstance`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceFlags {
    pub local_only: bool,
    pub include_qualifiers: bool,
    pub include_class_origin: bool,
}

impl InstanceFlags {
    pub fn full() -> Self {
        Self {
            local_only: false,
            include_qualifiers: true,
            include_class_origin: true,
        }
    }
}

/// Operations the exporter needs from a WBEM service
///
/// Every call may fail; failures carry an [`ErrorKind`](crate::error::ErrorKind)
/// so callers can tell "nothing here" from real errors.
pub trait WbemSession {
    /// Discover namespaces starting from `seeds`, within `timeout` overall
    fn list_namespaces(&self, seeds: &[String], timeout: Duration) -> WbemResult<Vec<String>>;

    /// All qualifier type declarations of a namespace
    fn list_qualifier_types(&self, namespace: &str) -> WbemResult<Vec<QualifierDecl>>;

    /// Class names of a namespace; `deep` includes subclasses at every level
    fn list_class_names(&self, namespace: &str, deep: bool) -> WbemResult<Vec<String>>;

    fn get_class(
        &self,
        namespace: &str,
        class_name: &str,
        flags: ClassFlags,
    ) -> WbemResult<ClassDefinition>;

    /// Paths of every instance of `class_name`, subclasses included
    fn list_instance_paths(&self, namespace: &str, class_name: &str) -> WbemResult<Vec<InstancePath>>;

    fn get_instance(
        &self,
        namespace: &str,
        path: &InstancePath,
        flags: InstanceFlags,
    ) -> WbemResult<Instance>;
}
