//! CIM-XML over HTTP(S) client
//!
//! One blocking `reqwest` client per session; every intrinsic call is a
//! POST of an `IMETHODCALL` document with its own timeout. There are no
//! retries: a failed call is reported once and the caller moves on.

use super::xml::{self, IParam};
use super::{ClassDefinition, ClassFlags, Instance, InstanceFlags, InstancePath, QualifierDecl, WbemSession};
use crate::config::ServiceUrl;
use crate::error::{ErrorKind, WbemError, WbemResult};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::cell::Cell;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Interop namespaces probed for `CIM_Namespace` during discovery
const INTEROP_NAMESPACES: &[&str] = &["interop", "root/interop", "root/PG_InterOp"];

/// First message ID; IDs only need to be unique per connection
const FIRST_MESSAGE_ID: u64 = 1001;

/// Builder for CIM-XML sessions
pub struct CimXmlClientBuilder {
    url: ServiceUrl,
    timeout: Duration,
    username: String,
    password: String,
    accept_invalid_certs: bool,
    /// Directory receiving raw request/response captures
    debug_dir: Option<PathBuf>,
}

impl CimXmlClientBuilder {
    /// Create a new builder
    pub fn new(url: ServiceUrl) -> Self {
        Self {
            url,
            timeout: Duration::from_secs(30),
            username: String::new(),
            password: String::new(),
            accept_invalid_certs: true,
            debug_dir: None,
        }
    }

    /// Set per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set HTTP basic auth credentials
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    /// Accept self-signed / mismatched TLS certificates
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Save every exchange under `dir`
    pub fn debug_dir(mut self, dir: PathBuf) -> Self {
        self.debug_dir = Some(dir);
        self
    }

    /// Build the client; no request is sent yet
    pub fn build(self) -> WbemResult<CimXmlClient> {
        let endpoint = self
            .url
            .endpoint()
            .map_err(|e| WbemError::transport("Connect", e.to_string()))?;

        let http = Client::builder()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .timeout(self.timeout)
            .build()
            .map_err(|e| WbemError::transport("Connect", e.to_string()))?;

        if let Some(dir) = &self.debug_dir {
            std::fs::create_dir_all(dir).map_err(|e| {
                WbemError::new(
                    ErrorKind::Io,
                    "Connect",
                    format!("cannot create debug directory '{}': {}", dir.display(), e),
                )
            })?;
        }

        Ok(CimXmlClient {
            http,
            endpoint,
            username: self.username,
            password: self.password,
            timeout: self.timeout,
            next_id: Cell::new(FIRST_MESSAGE_ID),
            debug_dir: self.debug_dir,
        })
    }
}

/// A session with one CIM-XML service
///
/// Not `Sync`: the message ID counter is a plain `Cell`, matching the
/// single-threaded dump.
pub struct CimXmlClient {
    http: Client,
    endpoint: Url,
    username: String,
    password: String,
    timeout: Duration,
    next_id: Cell<u64>,
    debug_dir: Option<PathBuf>,
}

impl CimXmlClient {
    /// Service endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn next_message_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// Perform one intrinsic method call and return the response body
    fn call(
        &self,
        method: &str,
        namespace: &str,
        params: &[IParam<'_>],
        timeout: Duration,
    ) -> WbemResult<String> {
        let id = self.next_message_id();
        let body = xml::build_request(id, method, namespace, params);
        self.capture(id, method, "request", &body)?;

        debug!("{} #{} in {}", method, id, namespace);

        let response = self
            .http
            .post(self.endpoint.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, "application/xml; charset=\"utf-8\"")
            .header("CIMOperation", "MethodCall")
            .header("CIMMethod", method)
            .header("CIMObject", cim_object_header(namespace))
            .timeout(timeout)
            .body(body)
            .send()
            .map_err(|e| classify_request_error(method, timeout, &e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(WbemError::transport(
                method,
                format!("service rejected credentials ({})", status),
            ));
        }
        if !status.is_success() {
            let cim_error = response
                .headers()
                .get("CIMError")
                .and_then(|v| v.to_str().ok())
                .map(|v| format!(", CIMError: {}", v))
                .unwrap_or_default();
            return Err(WbemError::other(
                method,
                format!("HTTP status {}{}", status, cim_error),
            ));
        }

        let text = response
            .text()
            .map_err(|e| classify_request_error(method, timeout, &e))?;
        self.capture(id, method, "response", &text)?;
        Ok(text)
    }

    fn capture(&self, id: u64, method: &str, direction: &str, body: &str) -> WbemResult<()> {
        let Some(dir) = &self.debug_dir else {
            return Ok(());
        };
        let path = dir.join(format!("{:06}_{}.{}.xml", id, method, direction));
        std::fs::write(&path, body).map_err(|e| {
            WbemError::new(
                ErrorKind::Io,
                method,
                format!("cannot write '{}': {}", path.display(), e),
            )
        })
    }

    fn enumerate_instance_names(
        &self,
        namespace: &str,
        class_name: &str,
        timeout: Duration,
    ) -> WbemResult<Vec<InstancePath>> {
        const METHOD: &str = "EnumerateInstanceNames";
        let body = self.call(
            METHOD,
            namespace,
            &[IParam::ClassName("ClassName", class_name)],
            timeout,
        )?;
        xml::parse_instance_names(METHOD, namespace, &body)
    }
}

impl WbemSession for CimXmlClient {
    fn list_namespaces(&self, seeds: &[String], timeout: Duration) -> WbemResult<Vec<String>> {
        let deadline = Instant::now() + timeout;
        let mut discovery = Discovery::default();

        // Absolute names from CIM_Namespace in the interop namespaces and seeds
        let probes = INTEROP_NAMESPACES
            .iter()
            .map(|ns| ns.to_string())
            .chain(seeds.iter().cloned());
        for ns in probes {
            let Some(call_timeout) = remaining(deadline, self.timeout) else {
                break;
            };
            match self.enumerate_instance_names(&ns, "CIM_Namespace", call_timeout) {
                Ok(paths) => {
                    discovery.probed = true;
                    for path in paths {
                        if let Some(name) = path.key_string("Name") {
                            discovery.push(name.to_string());
                        }
                    }
                }
                Err(e) => discovery.failed(e)?,
            }
        }

        // Relative names from __Namespace, followed down from the seeds
        let mut queue: VecDeque<String> = seeds.iter().cloned().collect();
        while let Some(ns) = queue.pop_front() {
            let Some(call_timeout) = remaining(deadline, self.timeout) else {
                break;
            };
            match self.enumerate_instance_names(&ns, "__Namespace", call_timeout) {
                Ok(paths) => {
                    discovery.probed = true;
                    discovery.push(ns.clone());
                    for path in paths {
                        if let Some(name) = path.key_string("Name") {
                            let child = format!("{}/{}", ns, name);
                            if discovery.push(child.clone()) {
                                queue.push_back(child);
                            }
                        }
                    }
                }
                Err(e) => discovery.failed(e)?,
            }
        }

        discovery.finish(deadline)
    }

    fn list_qualifier_types(&self, namespace: &str) -> WbemResult<Vec<QualifierDecl>> {
        const METHOD: &str = "EnumerateQualifiers";
        let body = self.call(METHOD, namespace, &[], self.timeout)?;
        xml::parse_qualifier_decls(METHOD, &body)
    }

    fn list_class_names(&self, namespace: &str, deep: bool) -> WbemResult<Vec<String>> {
        const METHOD: &str = "EnumerateClassNames";
        let body = self.call(
            METHOD,
            namespace,
            &[IParam::Bool("DeepInheritance", deep)],
            self.timeout,
        )?;
        xml::parse_class_names(METHOD, &body)
    }

    fn get_class(
        &self,
        namespace: &str,
        class_name: &str,
        flags: ClassFlags,
    ) -> WbemResult<ClassDefinition> {
        const METHOD: &str = "GetClass";
        let body = self.call(
            METHOD,
            namespace,
            &[
                IParam::ClassName("ClassName", class_name),
                IParam::Bool("LocalOnly", flags.local_only),
                IParam::Bool("IncludeQualifiers", flags.include_qualifiers),
                IParam::Bool("IncludeClassOrigin", flags.include_class_origin),
            ],
            self.timeout,
        )?;
        xml::parse_class(METHOD, &body)
    }

    fn list_instance_paths(&self, namespace: &str, class_name: &str) -> WbemResult<Vec<InstancePath>> {
        self.enumerate_instance_names(namespace, class_name, self.timeout)
    }

    fn get_instance(
        &self,
        namespace: &str,
        path: &InstancePath,
        flags: InstanceFlags,
    ) -> WbemResult<Instance> {
        const METHOD: &str = "GetInstance";
        let body = self.call(
            METHOD,
            namespace,
            &[
                IParam::InstanceName("InstanceName", path),
                IParam::Bool("LocalOnly", flags.local_only),
                IParam::Bool("IncludeQualifiers", flags.include_qualifiers),
                IParam::Bool("IncludeClassOrigin", flags.include_class_origin),
            ],
            self.timeout,
        )?;
        xml::parse_instance(METHOD, &body)
    }
}

/// Accumulated namespace discovery state
#[derive(Default)]
struct Discovery {
    found: Vec<String>,
    seen: HashSet<String>,
    /// At least one probe answered
    probed: bool,
    last_error: Option<WbemError>,
}

impl Discovery {
    /// Record a namespace; false if it was already known
    fn push(&mut self, namespace: String) -> bool {
        if self.seen.insert(namespace.clone()) {
            self.found.push(namespace);
            true
        } else {
            false
        }
    }

    /// Fatal failures end discovery, anything else is remembered
    fn failed(&mut self, err: WbemError) -> WbemResult<()> {
        if err.is_fatal() {
            return Err(err);
        }
        debug!("namespace probe failed: {}", err);
        self.last_error = Some(err);
        Ok(())
    }

    fn finish(self, deadline: Instant) -> WbemResult<Vec<String>> {
        if self.probed {
            return Ok(self.found);
        }
        if let Some(err) = self.last_error {
            return Err(err);
        }
        if Instant::now() >= deadline {
            return Err(WbemError::other(
                "EnumerateNamespaces",
                "namespace discovery timed out",
            ));
        }
        Ok(self.found)
    }
}

/// Time left before `deadline`, capped at `per_call`
fn remaining(deadline: Instant, per_call: Duration) -> Option<Duration> {
    let left = deadline.checked_duration_since(Instant::now())?;
    if left.is_zero() {
        None
    } else {
        Some(left.min(per_call))
    }
}

fn cim_object_header(namespace: &str) -> String {
    url::form_urlencoded::byte_serialize(namespace.as_bytes()).collect()
}

fn classify_request_error(method: &str, timeout: Duration, err: &reqwest::Error) -> WbemError {
    if err.is_timeout() {
        WbemError::other(
            method,
            format!("request timed out after {}s", timeout.as_secs()),
        )
    } else if err.is_connect() {
        WbemError::transport(method, format!("connection failed: {}", err))
    } else {
        WbemError::other(method, err.to_string())
    }
}
