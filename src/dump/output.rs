//! On-disk layout of a dump
//!
//! ```text
//! <root>/
//! └── <ns>/                      namespace, sanitized (root/cimv2 -> root#cimv2)
//!     ├── qa.xml                 qualifier type declarations
//!     ├── error.txt              instance enumeration failures, one per line
//!     ├── <Class>.xml            class definition
//!     └── <Class>/
//!         ├── instances.txt      instance paths enumerated for <Class>
//!         └── instance_<n>.xml   instances whose own class is <Class>
//! ```
//!
//! Every write failure is fatal: a dump that cannot be persisted is useless.

use super::sanitize::sanitize;
use crate::error::{DumpError, Result};
use crate::wbem::{InstancePath, QualifierDecl};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const QUALIFIERS_FILE: &str = "qa.xml";
pub const ERROR_FILE: &str = "error.txt";
pub const INSTANCE_LIST_FILE: &str = "instances.txt";

const LINE_END: &str = "\r\n";

/// Writer for one dump's output directory
#[derive(Debug)]
pub struct OutputTree {
    root: PathBuf,
    bytes_written: u64,
    files_written: u64,
}

impl OutputTree {
    /// Directories are created lazily on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bytes_written: 0,
            files_written: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn files_written(&self) -> u64 {
        self.files_written
    }

    pub fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(sanitize(namespace))
    }

    pub fn class_dir(&self, namespace: &str, class_name: &str) -> PathBuf {
        self.namespace_dir(namespace).join(sanitize(class_name))
    }

    pub fn qualifiers_path(&self, namespace: &str) -> PathBuf {
        self.namespace_dir(namespace).join(QUALIFIERS_FILE)
    }

    pub fn class_path(&self, namespace: &str, class_name: &str) -> PathBuf {
        self.namespace_dir(namespace)
            .join(format!("{}.xml", sanitize(class_name)))
    }

    pub fn error_path(&self, namespace: &str) -> PathBuf {
        self.namespace_dir(namespace).join(ERROR_FILE)
    }

    pub fn instance_list_path(&self, namespace: &str, class_name: &str) -> PathBuf {
        self.class_dir(namespace, class_name).join(INSTANCE_LIST_FILE)
    }

    pub fn instance_path(&self, namespace: &str, owner_class: &str, index: usize) -> PathBuf {
        self.class_dir(namespace, owner_class)
            .join(format!("instance_{}.xml", index))
    }

    /// Write `<ns>/qa.xml`
    pub fn write_qualifiers(&mut self, namespace: &str, decls: &[QualifierDecl]) -> Result<PathBuf> {
        let path = self.qualifiers_path(namespace);
        self.write_file(&path, render_declarations(decls).as_bytes())?;
        Ok(path)
    }

    /// Write `<ns>/<Class>.xml` verbatim
    pub fn write_class(&mut self, namespace: &str, class_name: &str, xml: &str) -> Result<PathBuf> {
        let path = self.class_path(namespace, class_name);
        self.write_file(&path, xml.as_bytes())?;
        Ok(path)
    }

    /// Write `<ns>/<Class>/instances.txt`
    pub fn write_instance_list(
        &mut self,
        namespace: &str,
        class_name: &str,
        paths: &[InstancePath],
    ) -> Result<PathBuf> {
        let mut buf = String::new();
        for p in paths {
            buf.push_str(&p.to_string());
            buf.push_str(LINE_END);
        }
        let path = self.instance_list_path(namespace, class_name);
        self.write_file(&path, buf.as_bytes())?;
        Ok(path)
    }

    /// Write `<ns>/<Owner>/instance_<index>.xml`
    pub fn write_instance(
        &mut self,
        namespace: &str,
        owner_class: &str,
        index: usize,
        xml: &str,
    ) -> Result<PathBuf> {
        let path = self.instance_path(namespace, owner_class, index);
        self.write_file(&path, xml.as_bytes())?;
        Ok(path)
    }

    /// Add a `<Class>: <error>` line to `<ns>/error.txt`
    ///
    /// `truncate` starts a fresh file; the first failure of a namespace
    /// traversal passes it so stale lines from earlier runs are dropped.
    pub fn append_error(
        &mut self,
        namespace: &str,
        class_name: &str,
        message: &str,
        truncate: bool,
    ) -> Result<PathBuf> {
        let path = self.error_path(namespace);
        self.ensure_parent(&path)?;

        let line = format!("{}: {}{}", class_name, message, LINE_END);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!truncate)
            .truncate(truncate)
            .open(&path)
            .map_err(|e| io_error(&path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| io_error(&path, e))?;

        self.bytes_written += line.len() as u64;
        if truncate {
            self.files_written += 1;
        }
        Ok(path)
    }

    fn write_file(&mut self, path: &Path, contents: &[u8]) -> Result<()> {
        self.ensure_parent(path)?;
        fs::write(path, contents).map_err(|e| io_error(path, e))?;
        self.bytes_written += contents.len() as u64;
        self.files_written += 1;
        Ok(())
    }

    fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        Ok(())
    }
}

/// Aggregate declaration document for qa.xml
pub fn render_declarations(decls: &[QualifierDecl]) -> String {
    let mut sb = String::from(
        "<?xml version=\"1.0\"?>\n<CIM CIMVERSION=\"2.0\" DTDVERSION=\"2.0\">\n<DECLARATION>\n<DECLGROUP>",
    );
    for decl in decls {
        sb.push_str(LINE_END);
        sb.push_str("<VALUE.OBJECT>");
        sb.push_str(LINE_END);
        sb.push_str(&decl.xml);
        sb.push_str(LINE_END);
        sb.push_str("</VALUE.OBJECT>");
        sb.push_str(LINE_END);
    }
    sb.push_str("</DECLGROUP>\n</DECLARATION>\n</CIM>");
    sb
}

fn io_error(path: &Path, source: std::io::Error) -> DumpError {
    DumpError::Io {
        path: path.to_path_buf(),
        source,
    }
}
