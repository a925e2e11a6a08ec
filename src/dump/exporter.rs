//! Namespace / class / instance traversal
//!
//! The walk is strictly top-down and sequential:
//!
//! ```text
//! run
//! └── for each namespace          (explicit, or discovered from root/cimv2)
//!     ├── qualifier types  -> qa.xml
//!     ├── class names (deep)
//!     └── for each class          (shares one InstanceCache per namespace)
//!         ├── class definition -> <Class>.xml
//!         ├── instance paths   -> <Class>/instances.txt
//!         └── for each path not yet in the cache
//!             └── instance     -> <Owner>/instance_<n>.xml
//! ```
//!
//! Failures below the namespace level are logged and skipped. Only local
//! I/O errors, transport errors and a failed namespace discovery end the
//! run.

use super::cache::InstanceCache;
use super::output::OutputTree;
use super::sanitize::is_path_segment;
use crate::config::{DumpConfig, DEFAULT_SEED_NAMESPACE};
use crate::error::{DumpError, Result, WbemError};
use crate::wbem::{ClassFlags, InstanceFlags, WbemSession};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Counters for a dump
#[derive(Debug, Clone, Default)]
pub struct DumpStats {
    /// Namespaces whose export was started
    pub namespaces: u64,
    /// Classes whose export was started
    pub classes: u64,
    /// Class definitions written
    pub class_definitions: u64,
    /// Class definitions that could not be fetched
    pub failed_classes: u64,
    /// Classes whose instance enumeration failed
    pub failed_enumerations: u64,
    /// Instances written
    pub instances: u64,
    /// Instances that could not be fetched
    pub failed_instances: u64,
    /// Instance paths skipped because another class already fetched them
    pub duplicate_instances: u64,
    pub bytes_written: u64,
    pub duration: Duration,
    pub completed: bool,
}

impl DumpStats {
    /// Failures of every kind
    pub fn errors(&self) -> u64 {
        self.failed_classes + self.failed_enumerations + self.failed_instances
    }
}

/// Snapshot passed to the progress callback
#[derive(Debug, Clone, Default)]
pub struct DumpProgress {
    pub namespace: String,
    pub class_name: Option<String>,
    pub classes: u64,
    pub instances: u64,
    pub errors: u64,
    pub elapsed: Duration,
}

impl DumpProgress {
    pub fn instances_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.instances as f64 / secs
        } else {
            0.0
        }
    }
}

/// Outcome of a whole dump
#[derive(Debug, Clone)]
pub struct DumpResult {
    /// Namespaces that were targeted
    pub namespaces: Vec<String>,
    pub stats: DumpStats,
}

impl DumpResult {
    /// A dump is successful when there was at least one namespace to export,
    /// regardless of individual class or instance failures
    pub fn is_success(&self) -> bool {
        !self.namespaces.is_empty()
    }
}

/// State owned by one namespace traversal
#[derive(Debug)]
pub struct NamespaceScope {
    namespace: String,
    cache: InstanceCache,
    /// error.txt has been started in this traversal
    error_log_started: bool,
}

impl NamespaceScope {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            cache: InstanceCache::new(),
            error_log_started: false,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn cache(&self) -> &InstanceCache {
        &self.cache
    }
}

type ProgressCallback<'a> = Box<dyn Fn(&DumpProgress) + 'a>;

/// Walks a WBEM service and writes what it finds
pub struct Exporter<'a, S: WbemSession + ?Sized> {
    session: &'a S,
    config: &'a DumpConfig,
    output: OutputTree,
    stats: DumpStats,
    shutdown: Arc<AtomicBool>,
    progress: Option<ProgressCallback<'a>>,
    start: Instant,
}

impl<'a, S: WbemSession + ?Sized> Exporter<'a, S> {
    pub fn new(session: &'a S, config: &'a DumpConfig) -> Self {
        Self {
            session,
            config,
            output: OutputTree::new(config.output_dir.clone()),
            stats: DumpStats::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
            progress: None,
            start: Instant::now(),
        }
    }

    /// Receive a snapshot every time a class export starts
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DumpProgress) + 'a,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Resolve the target namespaces and export each of them
    pub fn run(&mut self) -> Result<DumpResult> {
        self.start = Instant::now();

        if let Some((namespace, class_name)) = self.config.single_class() {
            let namespace = namespace.to_string();
            let class_name = class_name.to_string();
            self.export_single_class(&namespace, &class_name)?;
            return Ok(self.finish(vec![namespace]));
        }

        let namespaces = self.resolve_namespaces()?;
        info!("Namespaces: {:?}", namespaces);

        for namespace in &namespaces {
            if self.is_interrupted() {
                break;
            }
            if !is_path_segment(namespace) {
                warn!("Skipping namespace with unusable name {:?}", namespace);
                continue;
            }
            info!("Start processing {}", namespace);
            self.export_namespace(namespace)?;
        }

        let result = self.finish(namespaces);
        if !result.is_success() {
            warn!("No namespace to export");
        }
        Ok(result)
    }

    /// Explicit namespace, or discovery seeded from root/cimv2
    ///
    /// A failed discovery is fatal: without namespaces there is nothing to do.
    fn resolve_namespaces(&self) -> Result<Vec<String>> {
        if let Some(namespace) = &self.config.namespace {
            return Ok(vec![namespace.clone()]);
        }

        let seeds = [DEFAULT_SEED_NAMESPACE.to_string()];
        self.session
            .list_namespaces(&seeds, self.config.discovery_timeout)
            .map_err(DumpError::Wbem)
    }

    fn export_single_class(&mut self, namespace: &str, class_name: &str) -> Result<()> {
        self.stats.namespaces += 1;

        if self.config.only_class_names {
            println!("Classes in namespace {}:", namespace);
            println!("{}", class_name);
            return Ok(());
        }

        info!("Exporting class {} in namespace {}", class_name, namespace);
        let mut scope = NamespaceScope::new(namespace);
        self.export_class(&mut scope, class_name)?;
        self.report_failures(&scope);
        Ok(())
    }

    /// Export qualifier types, then every class of the namespace
    pub fn export_namespace(&mut self, namespace: &str) -> Result<()> {
        self.stats.namespaces += 1;

        if !self.config.only_class_names {
            self.export_qualifiers(namespace)?;
        }

        let class_names = match self.session.list_class_names(namespace, true) {
            Ok(names) => names,
            Err(e) => {
                contain(&e)?;
                if !e.is_silent() {
                    warn!("Failed to enumerate class names in {}: {}", namespace, e);
                }
                return Ok(());
            }
        };

        if class_names.is_empty() {
            info!("No class definitions in {}", namespace);
            return Ok(());
        }

        if self.config.only_class_names {
            println!("Classes in namespace {}:", namespace);
            for class_name in &class_names {
                println!("{}", class_name);
            }
            return Ok(());
        }

        info!(
            "Namespace {} has {} classes: {:?}",
            namespace,
            class_names.len(),
            class_names
        );

        let mut scope = NamespaceScope::new(namespace);
        for class_name in &class_names {
            if self.is_interrupted() {
                break;
            }
            if !is_path_segment(class_name) {
                warn!("Skipping class with unusable name {:?}", class_name);
                self.stats.failed_classes += 1;
                continue;
            }
            self.export_class(&mut scope, class_name)?;
        }

        self.report_failures(&scope);
        Ok(())
    }

    fn export_qualifiers(&mut self, namespace: &str) -> Result<()> {
        match self.session.list_qualifier_types(namespace) {
            Ok(decls) if decls.is_empty() => {
                debug!("No qualifier types in {}", namespace);
            }
            Ok(decls) => {
                let path = self.output.write_qualifiers(namespace, &decls)?;
                debug!("Wrote {} qualifier types to {}", decls.len(), path.display());
            }
            Err(e) => {
                contain(&e)?;
                if !e.is_silent() {
                    warn!("Enumerating qualifier types in {} failed: {}", namespace, e);
                }
            }
        }
        Ok(())
    }

    /// Export one class definition, then its instances
    ///
    /// Instances are exported even when the definition cannot be fetched;
    /// the two are independent best-effort operations.
    pub fn export_class(&mut self, scope: &mut NamespaceScope, class_name: &str) -> Result<()> {
        self.stats.classes += 1;
        self.report_progress(scope.namespace(), Some(class_name));

        match self
            .session
            .get_class(scope.namespace(), class_name, ClassFlags::full())
        {
            Ok(definition) => {
                self.output
                    .write_class(scope.namespace(), class_name, &definition.xml)?;
                self.stats.class_definitions += 1;
            }
            Err(e) => {
                contain(&e)?;
                self.stats.failed_classes += 1;
                if e.is_silent() {
                    debug!("No definition for class {}: {}", class_name, e);
                } else {
                    warn!("Failed to get class {}: {}", class_name, e);
                }
            }
        }

        self.export_instances(scope, class_name)
    }

    /// Export every not-yet-fetched instance of one class
    pub fn export_instances(&mut self, scope: &mut NamespaceScope, class_name: &str) -> Result<()> {
        let namespace = scope.namespace.clone();

        let paths = match self.session.list_instance_paths(&namespace, class_name) {
            Ok(paths) => paths,
            Err(e) => {
                contain(&e)?;
                self.stats.failed_enumerations += 1;
                let truncate = !scope.error_log_started;
                self.output
                    .append_error(&namespace, class_name, &e.to_string(), truncate)?;
                scope.error_log_started = true;

                info!("{} 0 {}", class_name, e);
                if !e.is_silent() {
                    warn!("{} [{}] {}", class_name, e.kind, e.message);
                }
                return Ok(());
            }
        };

        info!("{} {}", class_name, paths.len());
        if paths.is_empty() {
            return Ok(());
        }

        self.output
            .write_instance_list(&namespace, class_name, &paths)?;

        for (index, path) in paths.iter().enumerate() {
            if self.is_interrupted() {
                break;
            }

            let key = path.to_string();
            if scope.cache.contains(&key) {
                self.stats.duplicate_instances += 1;
                continue;
            }

            match self
                .session
                .get_instance(&namespace, path, InstanceFlags::full())
            {
                Ok(instance) => {
                    let owner = [instance.class_name.as_str(), path.class_name.as_str()]
                        .into_iter()
                        .find(|name| is_path_segment(name));
                    let Some(owner) = owner else {
                        let e = WbemError::other(
                            "GetInstance",
                            format!("owning class {:?} is not a usable directory name", instance.class_name),
                        );
                        warn!("{} [{}] {}", key, e.kind, e.message);
                        scope.cache.record_failure(key, e);
                        self.stats.failed_instances += 1;
                        continue;
                    };
                    self.output
                        .write_instance(&namespace, owner, index, &instance.xml)?;
                    scope.cache.record_success(key);
                    self.stats.instances += 1;
                }
                Err(e) => {
                    contain(&e)?;
                    if !e.is_silent() {
                        warn!("{} [{}] {}", key, e.kind, e.message);
                    }
                    scope.cache.record_failure(key, e);
                    self.stats.failed_instances += 1;
                }
            }
        }

        Ok(())
    }

    fn report_failures(&self, scope: &NamespaceScope) {
        for (key, err) in scope.cache.failures() {
            warn!("{} Get failed: {}", key, err);
        }
    }

    fn report_progress(&self, namespace: &str, class_name: Option<&str>) {
        if let Some(callback) = &self.progress {
            callback(&DumpProgress {
                namespace: namespace.to_string(),
                class_name: class_name.map(str::to_string),
                classes: self.stats.classes,
                instances: self.stats.instances,
                errors: self.stats.errors(),
                elapsed: self.start.elapsed(),
            });
        }
    }

    fn is_interrupted(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn finish(&mut self, namespaces: Vec<String>) -> DumpResult {
        self.stats.duration = self.start.elapsed();
        self.stats.bytes_written = self.output.bytes_written();
        self.stats.completed = !self.is_interrupted();
        if !self.stats.completed {
            info!("Dump was interrupted before completion");
        }
        DumpResult {
            namespaces,
            stats: self.stats.clone(),
        }
    }
}

/// Let recoverable errors through, escalate transport and I/O failures
fn contain(err: &WbemError) -> Result<()> {
    if err.is_fatal() {
        return Err(DumpError::Wbem(err.clone()));
    }
    Ok(())
}
