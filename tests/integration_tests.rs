//! Integration tests for wbem-dump
//!
//! These drive the exporter against an in-memory WBEM session and check
//! the resulting directory tree. No CIM server is needed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::tempdir;
use wbem_dump::config::{CliArgs, DumpConfig};
use wbem_dump::dump::{sanitize, Exporter, NamespaceScope};
use wbem_dump::error::{DumpError, ErrorKind, WbemError, WbemResult};
use wbem_dump::wbem::xml::parse_instance;
use wbem_dump::wbem::{
    ClassDefinition, ClassFlags, Instance, InstanceFlags, InstancePath, KeyValue, QualifierDecl,
    WbemSession,
};
use clap::Parser;

/// In-memory service; instances are keyed by canonical path
struct MockSession {
    namespaces: WbemResult<Vec<String>>,
    qualifiers: HashMap<String, WbemResult<Vec<QualifierDecl>>>,
    classes: HashMap<String, WbemResult<Vec<String>>>,
    definitions: HashMap<(String, String), WbemResult<ClassDefinition>>,
    instance_paths: HashMap<(String, String), WbemResult<Vec<InstancePath>>>,
    instances: HashMap<String, WbemResult<Instance>>,
    calls: RefCell<Vec<String>>,
}

impl MockSession {
    fn new() -> Self {
        Self {
            namespaces: Ok(Vec::new()),
            qualifiers: HashMap::new(),
            classes: HashMap::new(),
            definitions: HashMap::new(),
            instance_paths: HashMap::new(),
            instances: HashMap::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn with_classes(mut self, ns: &str, classes: &[&str]) -> Self {
        self.classes.insert(
            ns.to_string(),
            Ok(classes.iter().map(|c| c.to_string()).collect()),
        );
        for class in classes {
            self.definitions.insert(
                (ns.to_string(), class.to_string()),
                Ok(ClassDefinition {
                    name: class.to_string(),
                    xml: format!("<CLASS NAME=\"{}\"/>", class),
                }),
            );
        }
        self
    }

    fn with_instances(mut self, ns: &str, class: &str, paths: &[InstancePath]) -> Self {
        self.instance_paths
            .insert((ns.to_string(), class.to_string()), Ok(paths.to_vec()));
        for path in paths {
            self.instances
                .entry(path.to_string())
                .or_insert_with(|| Ok(instance_for(path)));
        }
        self
    }

    fn fail_instance(mut self, path: &InstancePath, err: WbemError) -> Self {
        self.instances.insert(path.to_string(), Err(err));
        self
    }

    fn fail_instance_paths(mut self, ns: &str, class: &str, err: WbemError) -> Self {
        self.instance_paths
            .insert((ns.to_string(), class.to_string()), Err(err));
        self
    }

    fn fail_definition(mut self, ns: &str, class: &str, err: WbemError) -> Self {
        self.definitions
            .insert((ns.to_string(), class.to_string()), Err(err));
        self
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl WbemSession for MockSession {
    fn list_namespaces(&self, seeds: &[String], _timeout: Duration) -> WbemResult<Vec<String>> {
        self.record(format!("list_namespaces {:?}", seeds));
        self.namespaces.clone()
    }

    fn list_qualifier_types(&self, namespace: &str) -> WbemResult<Vec<QualifierDecl>> {
        self.record(format!("list_qualifier_types {}", namespace));
        self.qualifiers
            .get(namespace)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn list_class_names(&self, namespace: &str, _deep: bool) -> WbemResult<Vec<String>> {
        self.record(format!("list_class_names {}", namespace));
        self.classes
            .get(namespace)
            .cloned()
            .unwrap_or_else(|| Err(WbemError::empty_result("EnumerateClassNames")))
    }

    fn get_class(&self, namespace: &str, class_name: &str, _flags: ClassFlags) -> WbemResult<ClassDefinition> {
        self.record(format!("get_class {}", class_name));
        self.definitions
            .get(&(namespace.to_string(), class_name.to_string()))
            .cloned()
            .unwrap_or_else(|| Err(WbemError::other("GetClass", "no such class")))
    }

    fn list_instance_paths(&self, namespace: &str, class_name: &str) -> WbemResult<Vec<InstancePath>> {
        self.record(format!("list_instance_paths {}", class_name));
        self.instance_paths
            .get(&(namespace.to_string(), class_name.to_string()))
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn get_instance(&self, _namespace: &str, path: &InstancePath, _flags: InstanceFlags) -> WbemResult<Instance> {
        self.record(format!("get_instance {}", path));
        self.instances
            .get(&path.to_string())
            .cloned()
            .unwrap_or_else(|| Err(WbemError::other("GetInstance", "no such instance")))
    }
}

fn instance_for(path: &InstancePath) -> Instance {
    Instance {
        class_name: path.class_name.clone(),
        xml: format!("<INSTANCE CLASSNAME=\"{}\"><!-- {} --></INSTANCE>", path.class_name, path),
    }
}

fn path(ns: &str, class: &str, id: &str) -> InstancePath {
    InstancePath::new(ns, class).with_key("Id", KeyValue::String(id.to_string()))
}

fn config(output: &Path, extra: &[&str]) -> DumpConfig {
    let output = output.display().to_string();
    let mut argv = vec!["wbem-dump", "--output", output.as_str()];
    argv.extend_from_slice(extra);
    DumpConfig::from_args(CliArgs::parse_from(argv)).unwrap()
}

/// Every instance_*.xml under `dir`, recursively
fn instance_files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let p = entry.path();
            if p.is_dir() {
                found.extend(instance_files(&p));
            } else if p
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("instance_"))
            {
                found.push(p);
            }
        }
    }
    found.sort();
    found
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_shared_instance_fetched_once() {
    let ns = "root/cimv2";
    let (p1, p2, p3) = (path(ns, "CIM_A", "1"), path(ns, "CIM_A", "2"), path(ns, "CIM_B", "3"));
    let session = MockSession::new()
        .with_classes(ns, &["CIM_A", "CIM_B"])
        .with_instances(ns, "CIM_A", &[p1.clone(), p2.clone()])
        .with_instances(ns, "CIM_B", &[p2.clone(), p3.clone()]);

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    let mut exporter = Exporter::new(&session, &config);
    let result = exporter.run().unwrap();

    assert!(result.is_success());
    assert!(result.stats.completed);

    let ns_dir = dir.path().join(sanitize(ns));
    assert!(ns_dir.join("CIM_A.xml").exists());
    assert!(ns_dir.join("CIM_B.xml").exists());
    assert_eq!(
        lines(&ns_dir.join("CIM_A/instances.txt")),
        vec![p1.to_string(), p2.to_string()]
    );
    assert_eq!(
        lines(&ns_dir.join("CIM_B/instances.txt")),
        vec![p2.to_string(), p3.to_string()]
    );

    assert_eq!(instance_files(&ns_dir).len(), 3);
    assert_eq!(session.count_calls(&format!("get_instance {}", p2)), 1);
    assert_eq!(session.count_calls("get_instance"), 3);
    assert_eq!(result.stats.instances, 3);
    assert_eq!(result.stats.duplicate_instances, 1);

    // p3 is at index 1 of CIM_B's enumeration
    assert!(ns_dir.join("CIM_B/instance_1.xml").exists());
    assert!(ns_dir.join("CIM_A/instance_0.xml").exists());
    assert!(ns_dir.join("CIM_A/instance_1.xml").exists());
}

#[test]
fn test_failed_instance_not_retried_by_other_class() {
    let ns = "root/cimv2";
    let shared = path(ns, "CIM_A", "shared");
    let session = MockSession::new()
        .with_classes(ns, &["CIM_A", "CIM_B"])
        .with_instances(ns, "CIM_A", &[shared.clone()])
        .with_instances(ns, "CIM_B", &[shared.clone()])
        .fail_instance(&shared, WbemError::other("GetInstance", "boom"));

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    let result = Exporter::new(&session, &config).run().unwrap();

    assert_eq!(session.count_calls("get_instance"), 1);
    assert_eq!(result.stats.failed_instances, 1);
    assert!(instance_files(dir.path()).is_empty());
}

#[test]
fn test_instances_filed_under_owning_class() {
    let ns = "root/cimv2";
    let sub = path(ns, "CIM_Sub", "1");
    let session = MockSession::new()
        .with_classes(ns, &["CIM_Base"])
        .with_instances(ns, "CIM_Base", &[sub.clone()]);

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    Exporter::new(&session, &config).run().unwrap();

    let ns_dir = dir.path().join("root#cimv2");
    assert!(ns_dir.join("CIM_Base/instances.txt").exists());
    assert!(ns_dir.join("CIM_Sub/instance_0.xml").exists());
    assert!(!ns_dir.join("CIM_Base/instance_0.xml").exists());
}

#[test]
fn test_enumeration_failure_isolated() {
    let ns = "root/cimv2";
    let (a, c) = (path(ns, "CIM_A", "a"), path(ns, "CIM_C", "c"));
    let session = MockSession::new()
        .with_classes(ns, &["CIM_A", "CIM_B", "CIM_C"])
        .with_instances(ns, "CIM_A", &[a])
        .with_instances(ns, "CIM_C", &[c])
        .fail_instance_paths(ns, "CIM_B", WbemError::other("EnumerateInstanceNames", "provider crashed"));

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    let result = Exporter::new(&session, &config).run().unwrap();

    let ns_dir = dir.path().join("root#cimv2");
    for class in ["CIM_A", "CIM_B", "CIM_C"] {
        assert!(ns_dir.join(format!("{}.xml", class)).exists(), "{} definition", class);
    }
    assert!(ns_dir.join("CIM_A/instance_0.xml").exists());
    assert!(ns_dir.join("CIM_C/instance_0.xml").exists());
    assert!(!ns_dir.join("CIM_B").exists());

    let errors = fs::read_to_string(ns_dir.join("error.txt")).unwrap();
    assert!(errors.starts_with("CIM_B: "));
    assert!(errors.contains("provider crashed"));
    assert_eq!(result.stats.failed_enumerations, 1);
}

#[test]
fn test_error_log_accumulates_per_class() {
    let ns = "root/cimv2";
    let session = MockSession::new()
        .with_classes(ns, &["CIM_A", "CIM_B"])
        .fail_instance_paths(ns, "CIM_A", WbemError::other("EnumerateInstanceNames", "first"))
        .fail_instance_paths(ns, "CIM_B", WbemError::not_supported("EnumerateInstanceNames", "second"));

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    Exporter::new(&session, &config).run().unwrap();

    let errors = lines(&dir.path().join("root#cimv2/error.txt"));
    assert_eq!(errors.len(), 2);
    assert!(errors[0].starts_with("CIM_A: ") && errors[0].contains("first"));
    assert!(errors[1].starts_with("CIM_B: ") && errors[1].contains("second"));
}

#[test]
fn test_instance_loop_continues_after_failure() {
    let ns = "root/cimv2";
    let paths: Vec<InstancePath> = (0..5).map(|i| path(ns, "CIM_A", &i.to_string())).collect();
    let session = MockSession::new()
        .with_classes(ns, &["CIM_A"])
        .with_instances(ns, "CIM_A", &paths)
        .fail_instance(&paths[2], WbemError::other("GetInstance", "timed out"));

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    let result = Exporter::new(&session, &config).run().unwrap();

    let class_dir = dir.path().join("root#cimv2/CIM_A");
    for i in [0, 1, 3, 4] {
        assert!(class_dir.join(format!("instance_{}.xml", i)).exists());
    }
    assert!(!class_dir.join("instance_2.xml").exists());
    assert_eq!(session.count_calls("get_instance"), 5);
    assert_eq!(result.stats.instances, 4);
    assert_eq!(result.stats.failed_instances, 1);
}

#[test]
fn test_malformed_instance_response_does_not_abort() {
    let ns = "root/cimv2";
    let paths: Vec<InstancePath> = (0..3).map(|i| path(ns, "CIM_A", &i.to_string())).collect();

    // What the wire parser reports for a reply carrying an illegal character
    let body = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
                <CIM CIMVERSION=\"2.0\" DTDVERSION=\"2.0\"><MESSAGE ID=\"1\" PROTOCOLVERSION=\"1.0\">\
                <SIMPLERSP><IMETHODRESPONSE NAME=\"GetInstance\"><IRETURNVALUE>\
                <INSTANCE CLASSNAME=\"CIM_A\"><PROPERTY NAME=\"X\" TYPE=\"string\"><VALUE>a&#1;b</VALUE></PROPERTY></INSTANCE>\
                </IRETURNVALUE></IMETHODRESPONSE></SIMPLERSP></MESSAGE></CIM>";
    let parse_error = parse_instance("GetInstance", body).unwrap_err();

    let session = MockSession::new()
        .with_classes(ns, &["CIM_A"])
        .with_instances(ns, "CIM_A", &paths)
        .fail_instance(&paths[1], parse_error);

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    let result = Exporter::new(&session, &config).run().unwrap();

    let class_dir = dir.path().join("root#cimv2/CIM_A");
    assert!(class_dir.join("instance_0.xml").exists());
    assert!(!class_dir.join("instance_1.xml").exists());
    assert!(class_dir.join("instance_2.xml").exists());
    assert!(result.stats.completed);
    assert_eq!(result.stats.failed_instances, 1);
}

#[test]
fn test_unusable_class_names_stay_inside_namespace() {
    let ns = "root/cimv2";
    let good = path(ns, "CIM_A", "1");
    let mut session = MockSession::new()
        .with_classes(ns, &["..", "CIM_A"])
        .with_instances(ns, "CIM_A", &[good.clone()]);
    session.instances.insert(
        good.to_string(),
        Ok(Instance {
            class_name: "..".into(),
            xml: "<INSTANCE CLASSNAME=\"..\"/>".into(),
        }),
    );

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    let result = Exporter::new(&session, &config).run().unwrap();

    assert_eq!(session.count_calls("get_class .."), 0);
    assert_eq!(session.count_calls("list_instance_paths .."), 0);
    // Owner falls back to the enumerated path's class
    assert!(dir.path().join("root#cimv2/CIM_A/instance_0.xml").exists());
    assert!(!dir.path().join("instance_0.xml").exists());
    assert!(!dir.path().join("root#cimv2/instance_0.xml").exists());
    assert_eq!(result.stats.failed_classes, 1);
}

#[test]
fn test_definition_failure_still_exports_instances() {
    let ns = "root/cimv2";
    let session = MockSession::new()
        .with_classes(ns, &["CIM_A"])
        .with_instances(ns, "CIM_A", &[path(ns, "CIM_A", "x")])
        .fail_definition(ns, "CIM_A", WbemError::other("GetClass", "denied"));

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    let result = Exporter::new(&session, &config).run().unwrap();

    let ns_dir = dir.path().join("root#cimv2");
    assert!(!ns_dir.join("CIM_A.xml").exists());
    assert!(ns_dir.join("CIM_A/instance_0.xml").exists());
    assert_eq!(result.stats.failed_classes, 1);
}

#[test]
fn test_empty_namespace_is_not_an_error() {
    let ns = "root/empty";
    let mut session = MockSession::new();
    session.classes.insert(ns.to_string(), Ok(Vec::new()));

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    let result = Exporter::new(&session, &config).run().unwrap();

    assert!(result.is_success());
    assert_eq!(result.stats.errors(), 0);
    assert_eq!(session.count_calls("get_class"), 0);
    assert!(!dir.path().join("root#empty").exists());
}

#[test]
fn test_unsupported_class_enumeration_is_silent() {
    let ns = "root/unsupported";
    let mut session = MockSession::new();
    session.classes.insert(
        ns.to_string(),
        Err(WbemError::not_supported("EnumerateClassNames", "nope")),
    );

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    let result = Exporter::new(&session, &config).run().unwrap();
    assert!(result.is_success());
    assert_eq!(result.stats.classes, 0);
}

#[test]
fn test_qualifiers_written() {
    let ns = "root/cimv2";
    let mut session = MockSession::new().with_classes(ns, &[]);
    session.qualifiers.insert(
        ns.to_string(),
        Ok(vec![QualifierDecl {
            name: "Key".into(),
            xml: "<QUALIFIER.DECLARATION NAME=\"Key\" TYPE=\"boolean\"/>".into(),
        }]),
    );

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    Exporter::new(&session, &config).run().unwrap();

    let qa = fs::read_to_string(dir.path().join("root#cimv2/qa.xml")).unwrap();
    assert!(qa.contains("<DECLGROUP>"));
    assert!(qa.contains("<QUALIFIER.DECLARATION NAME=\"Key\" TYPE=\"boolean\"/>"));
}

#[test]
fn test_qualifier_failure_does_not_stop_classes() {
    let ns = "root/cimv2";
    let mut session = MockSession::new().with_classes(ns, &["CIM_A"]);
    session.qualifiers.insert(
        ns.to_string(),
        Err(WbemError::other("EnumerateQualifiers", "denied")),
    );

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    Exporter::new(&session, &config).run().unwrap();

    assert!(!dir.path().join("root#cimv2/qa.xml").exists());
    assert!(dir.path().join("root#cimv2/CIM_A.xml").exists());
}

#[test]
fn test_single_class_skips_discovery() {
    let ns = "root/cimv2";
    let session = MockSession::new()
        .with_classes(ns, &["CIM_A", "CIM_B"])
        .with_instances(ns, "CIM_A", &[path(ns, "CIM_A", "1")])
        .with_instances(ns, "CIM_B", &[path(ns, "CIM_B", "2")]);

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns, "--class", "CIM_A"]);
    let result = Exporter::new(&session, &config).run().unwrap();

    assert!(result.is_success());
    assert_eq!(session.count_calls("list_namespaces"), 0);
    assert_eq!(session.count_calls("list_class_names"), 0);
    assert_eq!(session.count_calls("get_class"), 1);
    assert!(dir.path().join("root#cimv2/CIM_A/instance_0.xml").exists());
    assert!(!dir.path().join("root#cimv2/CIM_B").exists());
}

#[test]
fn test_discovery_used_without_namespace() {
    let mut session = MockSession::new()
        .with_classes("root/cimv2", &["CIM_A"])
        .with_classes("root/interop", &["CIM_B"]);
    session.namespaces = Ok(vec!["root/cimv2".into(), "root/interop".into()]);

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &[]);
    let result = Exporter::new(&session, &config).run().unwrap();

    assert!(result.is_success());
    assert_eq!(result.namespaces.len(), 2);
    assert_eq!(session.count_calls("list_namespaces [\"root/cimv2\"]"), 1);
    assert!(dir.path().join("root#cimv2/CIM_A.xml").exists());
    assert!(dir.path().join("root#interop/CIM_B.xml").exists());
}

#[test]
fn test_zero_namespaces_is_failure() {
    let session = MockSession::new();

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &[]);
    let result = Exporter::new(&session, &config).run().unwrap();

    assert!(!result.is_success());
}

#[test]
fn test_discovery_failure_is_fatal() {
    let mut session = MockSession::new();
    session.namespaces = Err(WbemError::not_supported("EnumerateInstanceNames", "no interop"));

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &[]);
    let err = Exporter::new(&session, &config).run().unwrap_err();
    assert!(matches!(err, DumpError::Wbem(ref e) if e.kind == ErrorKind::NotSupported));
}

#[test]
fn test_transport_error_aborts() {
    let ns = "root/cimv2";
    let session = MockSession::new()
        .with_classes(ns, &["CIM_A", "CIM_B"])
        .fail_definition(ns, "CIM_A", WbemError::transport("GetClass", "connection reset"));

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    let err = Exporter::new(&session, &config).run().unwrap_err();

    assert!(matches!(err, DumpError::Wbem(ref e) if e.kind == ErrorKind::Transport));
    assert_eq!(session.count_calls("get_class"), 1);
}

#[test]
fn test_only_class_names_writes_nothing() {
    let ns = "root/cimv2";
    let session = MockSession::new()
        .with_classes(ns, &["CIM_A"])
        .with_instances(ns, "CIM_A", &[path(ns, "CIM_A", "1")]);

    let dir = tempdir().unwrap();
    let output = dir.path().join("out");
    let config = config(&output, &["--namespace", ns, "--onlyclass"]);
    let result = Exporter::new(&session, &config).run().unwrap();

    assert!(result.is_success());
    assert!(!output.exists());
    assert_eq!(session.count_calls("list_qualifier_types"), 0);
    assert_eq!(session.count_calls("get_class"), 0);
    assert_eq!(session.count_calls("list_instance_paths"), 0);
}

#[test]
fn test_interrupted_before_start() {
    let ns = "root/cimv2";
    let session = MockSession::new().with_classes(ns, &["CIM_A"]);

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    let mut exporter = Exporter::new(&session, &config);
    exporter
        .shutdown_flag()
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let result = exporter.run().unwrap();

    assert!(!result.stats.completed);
    assert_eq!(session.count_calls("list_class_names"), 0);
}

#[test]
fn test_export_class_shares_scope_cache() {
    let ns = "root/cimv2";
    let shared = path(ns, "CIM_A", "1");
    let session = MockSession::new()
        .with_classes(ns, &["CIM_A", "CIM_B"])
        .with_instances(ns, "CIM_A", &[shared.clone()])
        .with_instances(ns, "CIM_B", &[shared.clone()]);

    let dir = tempdir().unwrap();
    let config = config(dir.path(), &["--namespace", ns]);
    let mut exporter = Exporter::new(&session, &config);
    let mut scope = NamespaceScope::new(ns);
    exporter.export_class(&mut scope, "CIM_B").unwrap();
    exporter.export_class(&mut scope, "CIM_A").unwrap();

    assert_eq!(scope.cache().len(), 1);
    assert_eq!(session.count_calls("get_instance"), 1);
    // First enumeration to surface it wins; the file lives under its owning class
    assert!(dir.path().join("root#cimv2/CIM_A/instance_0.xml").exists());
}
