//! wbem-dump - WBEM/CIM Service Exporter
//!
//! A tool for dumping everything a WBEM service exposes (namespaces,
//! qualifier types, class definitions and instances) into a directory
//! tree of CIM-XML documents, for offline inspection or for replaying
//! against a simulator.
//!
//! # Features
//!
//! - **CIM-XML over HTTP(S)**: talks to any DSP0200 service (OpenPegasus,
//!   SFCB, ESXi, storage arrays) with basic auth; self-signed certificates
//!   are accepted unless `--strict-tls` is given.
//!
//! - **Best-effort traversal**: a class or instance that fails to export is
//!   logged and skipped; the rest of the namespace is still dumped.
//!
//! - **Instance deduplication**: an instance surfaced by several classes of
//!   a namespace is fetched once and filed under its own class.
//!
//! - **Deterministic layout**: file placement depends only on namespace,
//!   class name and enumeration index.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        CIM Server                               │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ CIM-XML (HTTP POST)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 CimXmlClient (WbemSession)                      │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Exporter                                │
//! │   namespace ──► qualifier types, class names                    │
//! │     class   ──► definition, instance paths                      │
//! │     instance──► InstanceCache check ──► GetInstance             │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//!                    ┌──────────────────────┐
//!                    │  OutputTree          │
//!                    │  <host>/<ns>/...     │
//!                    └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Dump everything
//! wbem-dump --host 192.168.1.157 --username root --password secret
//!
//! # One class over HTTPS
//! wbem-dump --host esx01 --port 5989 --namespace root/cimv2 --class CIM_Processor
//! ```

pub mod config;
pub mod dump;
pub mod error;
pub mod progress;
pub mod wbem;

pub use config::{CliArgs, DumpConfig, ServiceUrl};
pub use dump::{DumpResult, DumpStats, Exporter};
pub use error::{DumpError, ErrorKind, Result, WbemError};
pub use wbem::{CimXmlClient, CimXmlClientBuilder, WbemSession};
