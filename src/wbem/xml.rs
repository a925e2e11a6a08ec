//! CIM-XML request encoding and response decoding (DSP0200/DSP0201)
//!
//! Requests are small and built with `format!`. Responses are parsed with
//! roxmltree; objects we only store are sliced verbatim out of the
//! response body by node range, so what lands on disk is exactly what the
//! service sent.

use super::types::{ClassDefinition, Instance, InstancePath, KeyBinding, KeyValue, QualifierDecl};
use crate::error::{WbemError, WbemResult};
use roxmltree::{Document, Node};

/// An intrinsic method parameter (`IPARAMVALUE`)
#[derive(Debug, Clone)]
pub enum IParam<'a> {
    Bool(&'a str, bool),
    ClassName(&'a str, &'a str),
    InstanceName(&'a str, &'a InstancePath),
}

impl IParam<'_> {
    fn write(&self, out: &mut String) {
        match self {
            IParam::Bool(name, value) => {
                out.push_str(&format!(
                    "<IPARAMVALUE NAME=\"{}\"><VALUE>{}</VALUE></IPARAMVALUE>",
                    name,
                    if *value { "TRUE" } else { "FALSE" }
                ));
            }
            IParam::ClassName(name, class) => {
                out.push_str(&format!(
                    "<IPARAMVALUE NAME=\"{}\"><CLASSNAME NAME=\"{}\"/></IPARAMVALUE>",
                    name,
                    escape_xml(class)
                ));
            }
            IParam::InstanceName(name, path) => {
                out.push_str(&format!("<IPARAMVALUE NAME=\"{}\">", name));
                out.push_str(&path.to_xml());
                out.push_str("</IPARAMVALUE>");
            }
        }
    }
}

/// Build a complete `IMETHODCALL` request document
pub fn build_request(message_id: u64, method: &str, namespace: &str, params: &[IParam<'_>]) -> String {
    let mut out = String::with_capacity(512);
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n");
    out.push_str("<CIM CIMVERSION=\"2.0\" DTDVERSION=\"2.0\">");
    out.push_str(&format!(
        "<MESSAGE ID=\"{}\" PROTOCOLVERSION=\"1.0\">",
        message_id
    ));
    out.push_str("<SIMPLEREQ>");
    out.push_str(&format!("<IMETHODCALL NAME=\"{}\">", method));
    out.push_str(&local_namespace_path(namespace));
    for param in params {
        param.write(&mut out);
    }
    out.push_str("</IMETHODCALL></SIMPLEREQ></MESSAGE></CIM>");
    out
}

/// `LOCALNAMESPACEPATH` for a namespace; both `/` and `\` separate segments
pub fn local_namespace_path(namespace: &str) -> String {
    let mut out = String::from("<LOCALNAMESPACEPATH>");
    for segment in namespace.split(['/', '\\']).filter(|s| !s.is_empty()) {
        out.push_str(&format!("<NAMESPACE NAME=\"{}\"/>", escape_xml(segment)));
    }
    out.push_str("</LOCALNAMESPACEPATH>");
    out
}

pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Parse the body and hand the `IRETURNVALUE` element to `extract`
///
/// - not XML or not a CIM method response: Other, the body belongs to
///   one object and the session is still usable
/// - `ERROR` element: classified by status code
/// - no `IRETURNVALUE`: EmptyResult
fn with_return_value<T>(
    operation: &str,
    body: &str,
    extract: impl FnOnce(Node<'_, '_>) -> WbemResult<T>,
) -> WbemResult<T> {
    let doc = Document::parse(body).map_err(|e| {
        WbemError::other(operation, format!("response is not valid XML: {}", e))
    })?;

    let response = doc
        .descendants()
        .find(|n| n.has_tag_name("IMETHODRESPONSE"))
        .ok_or_else(|| {
            WbemError::other(operation, "response does not contain IMETHODRESPONSE")
        })?;

    if let Some(error) = child(response, "ERROR") {
        let code = error
            .attribute("CODE")
            .and_then(|c| c.trim().parse::<u32>().ok())
            .unwrap_or(1);
        let description = error.attribute("DESCRIPTION").unwrap_or_default();
        return Err(WbemError::from_cim_status(operation, code, description));
    }

    match child(response, "IRETURNVALUE") {
        Some(value) => extract(value),
        None => Err(WbemError::empty_result(operation)),
    }
}

/// `EnumerateClassNames` result
pub fn parse_class_names(operation: &str, body: &str) -> WbemResult<Vec<String>> {
    with_return_value(operation, body, |value| {
        children(value, "CLASSNAME")
            .map(|n| required_attr(operation, n, "NAME").map(str::to_string))
            .collect()
    })
}

/// `EnumerateInstanceNames` result
pub fn parse_instance_names(
    operation: &str,
    namespace: &str,
    body: &str,
) -> WbemResult<Vec<InstancePath>> {
    with_return_value(operation, body, |value| {
        children(value, "INSTANCENAME")
            .map(|n| parse_instance_name(operation, namespace, n))
            .collect()
    })
}

/// `GetClass` result
pub fn parse_class(operation: &str, body: &str) -> WbemResult<ClassDefinition> {
    with_return_value(operation, body, |value| {
        let class = child(value, "CLASS").ok_or_else(|| WbemError::empty_result(operation))?;
        Ok(ClassDefinition {
            name: required_attr(operation, class, "NAME")?.to_string(),
            xml: body[class.range()].to_string(),
        })
    })
}

/// `GetInstance` result
pub fn parse_instance(operation: &str, body: &str) -> WbemResult<Instance> {
    with_return_value(operation, body, |value| {
        let instance =
            child(value, "INSTANCE").ok_or_else(|| WbemError::empty_result(operation))?;
        Ok(Instance {
            class_name: instance.attribute("CLASSNAME").unwrap_or_default().to_string(),
            xml: body[instance.range()].to_string(),
        })
    })
}

/// `EnumerateQualifiers` result
pub fn parse_qualifier_decls(operation: &str, body: &str) -> WbemResult<Vec<QualifierDecl>> {
    with_return_value(operation, body, |value| {
        children(value, "QUALIFIER.DECLARATION")
            .map(|n| {
                Ok(QualifierDecl {
                    name: required_attr(operation, n, "NAME")?.to_string(),
                    xml: body[n.range()].to_string(),
                })
            })
            .collect()
    })
}

/// Parse an `INSTANCENAME` element; `namespace` is the namespace it lives in
pub fn parse_instance_name(
    operation: &str,
    namespace: &str,
    node: Node<'_, '_>,
) -> WbemResult<InstancePath> {
    let mut path = InstancePath::new(namespace, required_attr(operation, node, "CLASSNAME")?);

    for item in node.children().filter(|n| n.is_element()) {
        match item.tag_name().name() {
            "KEYBINDING" => {
                let name = required_attr(operation, item, "NAME")?;
                let value_node = item.children().find(|n| n.is_element()).ok_or_else(|| {
                    WbemError::other(operation, format!("key binding '{}' has no value", name))
                })?;
                let value = parse_key_value(operation, namespace, value_node)?;
                path.keys.push(KeyBinding::new(name, value));
            }
            // Single unnamed key
            "KEYVALUE" | "VALUE.REFERENCE" => {
                let value = parse_key_value(operation, namespace, item)?;
                path.keys.push(KeyBinding::new("", value));
            }
            other => {
                return Err(WbemError::other(
                    operation,
                    format!("unexpected element '{}' in INSTANCENAME", other),
                ));
            }
        }
    }

    Ok(path)
}

fn parse_key_value(operation: &str, namespace: &str, node: Node<'_, '_>) -> WbemResult<KeyValue> {
    match node.tag_name().name() {
        "KEYVALUE" => {
            let text = node.text().unwrap_or_default().to_string();
            match node.attribute("VALUETYPE").unwrap_or("string") {
                "boolean" => Ok(KeyValue::Boolean(text.trim().to_string())),
                "numeric" => Ok(KeyValue::Numeric(text.trim().to_string())),
                _ => Ok(KeyValue::String(text)),
            }
        }
        "VALUE.REFERENCE" => {
            let target = node.children().find(|n| n.is_element()).ok_or_else(|| {
                WbemError::other(operation, "empty VALUE.REFERENCE")
            })?;
            parse_reference(operation, namespace, target).map(|p| KeyValue::Reference(Box::new(p)))
        }
        other => Err(WbemError::other(
            operation,
            format!("unexpected key value element '{}'", other),
        )),
    }
}

fn parse_reference(operation: &str, namespace: &str, node: Node<'_, '_>) -> WbemResult<InstancePath> {
    match node.tag_name().name() {
        "INSTANCENAME" => parse_instance_name(operation, namespace, node),
        "LOCALINSTANCEPATH" => {
            let ns = child(node, "LOCALNAMESPACEPATH")
                .map(namespace_from_path)
                .unwrap_or_else(|| namespace.to_string());
            let name = child(node, "INSTANCENAME")
                .ok_or_else(|| WbemError::other(operation, "LOCALINSTANCEPATH without INSTANCENAME"))?;
            parse_instance_name(operation, &ns, name)
        }
        "INSTANCEPATH" => {
            // Host part is dropped: references are resolved against our own service
            let ns = child(node, "NAMESPACEPATH")
                .and_then(|p| child(p, "LOCALNAMESPACEPATH"))
                .map(namespace_from_path)
                .unwrap_or_else(|| namespace.to_string());
            let name = child(node, "INSTANCENAME")
                .ok_or_else(|| WbemError::other(operation, "INSTANCEPATH without INSTANCENAME"))?;
            parse_instance_name(operation, &ns, name)
        }
        other => Err(WbemError::other(
            operation,
            format!("unsupported reference target '{}'", other),
        )),
    }
}

/// Join `NAMESPACE` children of a `LOCALNAMESPACEPATH` with '/'
fn namespace_from_path(node: Node<'_, '_>) -> String {
    children(node, "NAMESPACE")
        .filter_map(|n| n.attribute("NAME"))
        .collect::<Vec<_>>()
        .join("/")
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |n| n.has_tag_name(tag))
}

fn required_attr<'a>(operation: &str, node: Node<'a, '_>, name: &str) -> WbemResult<&'a str> {
    node.attribute(name).ok_or_else(|| {
        WbemError::other(
            operation,
            format!(
                "element '{}' is missing attribute '{}'",
                node.tag_name().name(),
                name
            ),
        )
    })
}
