//! CIM object types returned from WBEM operations
//!
//! Class definitions, instances and qualifier declarations are kept as the
//! verbatim XML fragments the service sent; only instance paths are parsed
//! into structure, because they are both deduplication keys and request
//! parameters.

use super::xml::{escape_xml, local_namespace_path};
use std::cmp::Ordering;
use std::fmt;

/// A qualifier type declaration (`QUALIFIER.DECLARATION`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifierDecl {
    /// Qualifier name
    pub name: String,

    /// Verbatim XML element
    pub xml: String,
}

/// A class definition (`CLASS`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDefinition {
    /// Class name
    pub name: String,

    /// Verbatim XML element
    pub xml: String,
}

/// A fetched instance (`INSTANCE`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Class the instance actually belongs to; may be a subclass of the
    /// class whose enumeration surfaced it
    pub class_name: String,

    /// Verbatim XML element
    pub xml: String,
}

/// Value of a key property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValue {
    String(String),
    Boolean(String),
    Numeric(String),
    Reference(Box<InstancePath>),
}

impl KeyValue {
    /// `VALUETYPE` attribute for `KEYVALUE`
    fn value_type(&self) -> &'static str {
        match self {
            KeyValue::String(_) => "string",
            KeyValue::Boolean(_) => "boolean",
            KeyValue::Numeric(_) => "numeric",
            KeyValue::Reference(_) => "reference",
        }
    }

    fn write_xml(&self, out: &mut String) {
        match self {
            KeyValue::Reference(path) => {
                out.push_str("<VALUE.REFERENCE>");
                if path.namespace.is_empty() {
                    path.write_instance_name(out);
                } else {
                    out.push_str("<LOCALINSTANCEPATH>");
                    out.push_str(&local_namespace_path(&path.namespace));
                    path.write_instance_name(out);
                    out.push_str("</LOCALINSTANCEPATH>");
                }
                out.push_str("</VALUE.REFERENCE>");
            }
            KeyValue::String(v) | KeyValue::Boolean(v) | KeyValue::Numeric(v) => {
                out.push_str(&format!(
                    "<KEYVALUE VALUETYPE=\"{}\">{}</KEYVALUE>",
                    self.value_type(),
                    escape_xml(v)
                ));
            }
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::String(v) => write!(f, "\"{}\"", escape_quoted(v)),
            KeyValue::Reference(path) => write!(f, "\"{}\"", escape_quoted(&path.to_string())),
            KeyValue::Boolean(v) => f.write_str(&v.to_ascii_uppercase()),
            KeyValue::Numeric(v) => f.write_str(v),
        }
    }
}

/// One key property binding of an instance path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub name: String,
    pub value: KeyValue,
}

impl KeyBinding {
    pub fn new(name: impl Into<String>, value: KeyValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Identifies one concrete instance: namespace, class and key bindings
///
/// The `Display` form is canonical: keys are ordered case-insensitively by
/// name, so the same instance renders identically no matter which class
/// enumeration (or key order) produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePath {
    pub namespace: String,
    pub class_name: String,
    /// Keys in the order the service sent them
    pub keys: Vec<KeyBinding>,
}

impl InstancePath {
    pub fn new(namespace: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            class_name: class_name.into(),
            keys: Vec::new(),
        }
    }

    /// Append a key binding
    pub fn with_key(mut self, name: impl Into<String>, value: KeyValue) -> Self {
        self.keys.push(KeyBinding::new(name, value));
        self
    }

    /// Look up a key by name (case-insensitive, as CIM names are)
    pub fn key(&self, name: &str) -> Option<&KeyValue> {
        self.keys
            .iter()
            .find(|k| k.name.eq_ignore_ascii_case(name))
            .map(|k| &k.value)
    }

    /// String content of a non-reference key
    pub fn key_string(&self, name: &str) -> Option<&str> {
        match self.key(name)? {
            KeyValue::String(v) | KeyValue::Boolean(v) | KeyValue::Numeric(v) => Some(v),
            KeyValue::Reference(_) => None,
        }
    }

    /// True when the class has no keys (singleton)
    pub fn is_singleton(&self) -> bool {
        self.keys.is_empty()
    }

    /// Serialize as an `INSTANCENAME` element for request parameters
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_instance_name(&mut out);
        out
    }

    fn write_instance_name(&self, out: &mut String) {
        out.push_str(&format!(
            "<INSTANCENAME CLASSNAME=\"{}\">",
            escape_xml(&self.class_name)
        ));
        for key in &self.keys {
            out.push_str(&format!("<KEYBINDING NAME=\"{}\">", escape_xml(&key.name)));
            key.value.write_xml(out);
            out.push_str("</KEYBINDING>");
        }
        out.push_str("</INSTANCENAME>");
    }

    fn sorted_keys(&self) -> Vec<&KeyBinding> {
        let mut keys: Vec<&KeyBinding> = self.keys.iter().collect();
        keys.sort_by(|a, b| compare_names(&a.name, &b.name));
        keys
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.namespace.is_empty() {
            write!(f, "{}:", self.namespace)?;
        }
        f.write_str(&self.class_name)?;

        if self.is_singleton() {
            return f.write_str("=@");
        }

        for (i, key) in self.sorted_keys().into_iter().enumerate() {
            let sep = if i == 0 { '.' } else { ',' };
            write!(f, "{}{}={}", sep, key.name, key.value)?;
        }
        Ok(())
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_ascii_lowercase()
        .cmp(&b.to_ascii_lowercase())
        .then_with(|| a.cmp(b))
}

fn escape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(ch),
        }
    }
    out
}
