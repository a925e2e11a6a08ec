//! Configuration types for wbem-dump
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Service endpoint resolution (scheme/port defaulting)
//! - Runtime configuration with validation

use crate::error::ConfigError;
use clap::Parser;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

/// Default CIM-XML port over plain HTTP
pub const HTTP_PORT: u16 = 5988;

/// Default CIM-XML port over HTTPS
pub const HTTPS_PORT: u16 = 5989;

/// Namespace used to seed discovery when none is given
pub const DEFAULT_SEED_NAMESPACE: &str = "root/cimv2";

/// CIM class names are identifiers
static CLASS_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid class name regex")
});

/// Dump namespaces, qualifier types, classes and instances from a WBEM service
#[derive(Parser, Debug, Clone)]
#[command(
    name = "wbem-dump",
    version,
    about = "Dump the contents of a WBEM/CIM service to a directory tree",
    long_about = "Connects to a CIM-XML (WBEM) service, walks every namespace, class and instance \
                  it exposes and writes each object as XML under the output directory.\n\n\
                  Failures on individual classes or instances are reported and skipped; the \
                  dump is best-effort.",
    after_help = "EXAMPLES:\n    \
        wbem-dump --host 192.168.1.157 --port 5988 --username root --password rootpwd\n    \
        wbem-dump --host esx01 --port 5989 --namespace root/cimv2 --class CIM_ComputerSystem\n    \
        wbem-dump --host esx01 --onlyclass"
)]
pub struct CliArgs {
    /// URL scheme; empty selects it from the port (5988 = http, 5989 = https)
    #[arg(long, default_value = "", value_name = "SCHEME")]
    pub scheme: String,

    /// IP address or hostname of the CIM service
    #[arg(long, default_value = "192.168.1.157", value_name = "HOST")]
    pub host: String,

    /// Port of the CIM service; 0 selects it from the scheme (http = 5988, https = 5989)
    #[arg(long, default_value_t = 0, value_name = "PORT")]
    pub port: u16,

    /// CIM service access path
    #[arg(long, default_value = "/cimom", value_name = "PATH")]
    pub path: String,

    /// CIM namespace; all namespaces are discovered when omitted
    #[arg(long, value_name = "NAMESPACE")]
    pub namespace: Option<String>,

    /// CIM class name (requires --namespace)
    #[arg(long = "class", value_name = "CLASS")]
    pub class_name: Option<String>,

    /// List only class names, do not fetch or write anything
    #[arg(long = "onlyclass")]
    pub only_class: bool,

    /// Username
    #[arg(long, default_value = "root", value_name = "USER")]
    pub username: String,

    /// User password
    #[arg(long, default_value = "root", value_name = "PASSWORD")]
    pub password: String,

    /// Output directory (default: ./<host>)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30", value_name = "SECS")]
    pub timeout: u64,

    /// Overall namespace discovery timeout in seconds
    #[arg(long, default_value = "30", value_name = "SECS")]
    pub discovery_timeout: u64,

    /// Verify TLS certificates (self-signed certificates are accepted by default)
    #[arg(long)]
    pub strict_tls: bool,

    /// Save every CIM-XML request and response under <output>/debug
    #[arg(long)]
    pub debug: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// URL scheme of the CIM service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => HTTP_PORT,
            Scheme::Https => HTTPS_PORT,
        }
    }

    fn parse(scheme: &str) -> Result<Option<Self>, ConfigError> {
        match scheme.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "http" => Ok(Some(Scheme::Http)),
            "https" => Ok(Some(Scheme::Https)),
            _ => Err(ConfigError::InvalidScheme {
                scheme: scheme.to_string(),
            }),
        }
    }
}

/// Resolved location of the CIM service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrl {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Access path, always starting with '/'
    pub path: String,
}

impl ServiceUrl {
    /// Resolve scheme and port against each other
    ///
    /// - port 0 takes the scheme's default port (no scheme means http/5988)
    /// - no scheme takes it from the port: 5989 is https, anything else http
    pub fn resolve(scheme: &str, host: &str, port: u16, path: &str) -> Result<Self, ConfigError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: String::new(),
                reason: "Empty host".into(),
            });
        }

        let (scheme, port) = match (Scheme::parse(scheme)?, port) {
            (Some(s), 0) => (s, s.default_port()),
            (None, 0) => (Scheme::Http, HTTP_PORT),
            (Some(s), p) => (s, p),
            (None, HTTPS_PORT) => (Scheme::Https, HTTPS_PORT),
            (None, p) => (Scheme::Http, p),
        };

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path,
        })
    }

    /// Endpoint URL that requests are POSTed to
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let raw = format!("{}://{}:{}{}", self.scheme.as_str(), host, self.port, self.path);
        Url::parse(&raw).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: raw,
            reason: e.to_string(),
        })
    }

    /// Format for display (no credentials)
    pub fn to_display_string(&self) -> String {
        format!("{}://{}:{}{}", self.scheme.as_str(), self.host, self.port, self.path)
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct DumpConfig {
    /// Resolved CIM service location
    pub service: ServiceUrl,

    pub username: String,

    pub password: String,

    /// Explicit target namespace (skips discovery)
    pub namespace: Option<String>,

    /// Explicit target class (always paired with `namespace`)
    pub class_name: Option<String>,

    /// Print class names only
    pub only_class_names: bool,

    /// Output root directory
    pub output_dir: PathBuf,

    /// Per-request timeout
    pub timeout: Duration,

    /// Overall namespace discovery deadline
    pub discovery_timeout: Duration,

    /// Verify TLS certificates
    pub strict_tls: bool,

    /// Capture wire exchanges under `<output>/debug`
    pub debug: bool,

    /// Show progress indicator
    pub show_progress: bool,
}

impl DumpConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let service = ServiceUrl::resolve(&args.scheme, &args.host, args.port, &args.path)?;
        // Reject endpoints that cannot be turned into a URL up front
        service.endpoint()?;

        let namespace = non_empty(args.namespace);
        let class_name = non_empty(args.class_name);

        if let Some(class) = &class_name {
            if namespace.is_none() {
                return Err(ConfigError::ClassWithoutNamespace {
                    class: class.clone(),
                });
            }
            if !CLASS_NAME_REGEX.is_match(class) {
                return Err(ConfigError::InvalidClassName {
                    class: class.clone(),
                });
            }
        }

        if args.timeout == 0 {
            return Err(ConfigError::InvalidTimeout { what: "requests" });
        }
        if args.discovery_timeout == 0 {
            return Err(ConfigError::InvalidTimeout {
                what: "namespace discovery",
            });
        }

        let output_dir = match args.output {
            Some(dir) if dir.as_os_str().is_empty() => {
                return Err(ConfigError::InvalidOutputPath {
                    path: dir,
                    reason: "Output directory must not be empty".into(),
                });
            }
            Some(dir) => dir,
            None => PathBuf::from(".").join(&service.host),
        };

        if output_dir.is_file() {
            return Err(ConfigError::InvalidOutputPath {
                path: output_dir,
                reason: "Path exists and is a file".into(),
            });
        }

        Ok(Self {
            service,
            username: args.username,
            password: args.password,
            namespace,
            class_name,
            only_class_names: args.only_class,
            output_dir,
            timeout: Duration::from_secs(args.timeout),
            discovery_timeout: Duration::from_secs(args.discovery_timeout),
            strict_tls: args.strict_tls,
            debug: args.debug,
            show_progress: !args.quiet,
        })
    }

    /// The (namespace, class) pair when both were given explicitly
    pub fn single_class(&self) -> Option<(&str, &str)> {
        match (&self.namespace, &self.class_name) {
            (Some(ns), Some(class)) => Some((ns.as_str(), class.as_str())),
            _ => None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
