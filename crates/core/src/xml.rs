//! FHIR XML encoding of assembled bundles and small helpers for reading
//! FHIR XML responses.
//!
//! Primitives become `value` attributes, arrays repeat their element, and
//! nested resources are wrapped in an element named after their type.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use serde_json::{Map, Value as JsonValue};

use crate::bundle::Bundle;
use crate::error::SubmitResult;

pub const FHIR_NS: &str = "http://hl7.org/fhir";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Serialize a bundle as a FHIR XML document
pub fn bundle_to_xml(bundle: &Bundle) -> SubmitResult<String> {
    let value = serde_json::to_value(bundle)?;
    resource_to_xml(&value)
}

/// Serialize any FHIR JSON resource as XML
pub fn resource_to_xml(resource: &JsonValue) -> SubmitResult<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_resource(&mut writer, resource, true)?;
    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8(bytes)?)
}

fn write_resource(writer: &mut XmlWriter, resource: &JsonValue, root: bool) -> SubmitResult<()> {
    let Some(obj) = resource.as_object() else {
        return Ok(());
    };
    let resource_type = obj
        .get("resourceType")
        .and_then(JsonValue::as_str)
        .unwrap_or("Resource");

    let mut start = BytesStart::new(resource_type);
    if root {
        start.push_attribute(("xmlns", FHIR_NS));
    }
    writer.write_event(Event::Start(start))?;

    // Inside a resource `id` is an element, not an attribute.
    for (k, v) in obj {
        if k == "resourceType" {
            continue;
        }
        write_value(writer, k, v)?;
    }

    writer.write_event(Event::End(BytesEnd::new(resource_type)))?;
    Ok(())
}

fn write_value(writer: &mut XmlWriter, name: &str, value: &JsonValue) -> SubmitResult<()> {
    match value {
        JsonValue::Array(items) => {
            for item in items {
                write_value(writer, name, item)?;
            }
        }
        JsonValue::Object(obj) if obj.contains_key("resourceType") => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            write_resource(writer, value, false)?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        JsonValue::Object(obj) => write_complex(writer, name, obj)?,
        JsonValue::Null => {}
        primitive => {
            let mut elem = BytesStart::new(name);
            elem.push_attribute(("value", primitive_to_string(primitive).as_str()));
            writer.write_event(Event::Empty(elem))?;
        }
    }
    Ok(())
}

fn write_complex(
    writer: &mut XmlWriter,
    name: &str,
    obj: &Map<String, JsonValue>,
) -> SubmitResult<()> {
    let mut start = BytesStart::new(name);
    if let Some(JsonValue::String(id)) = obj.get("id") {
        start.push_attribute(("id", id.as_str()));
    }

    writer.write_event(Event::Start(start))?;
    for (k, v) in obj {
        if k == "id" {
            continue;
        }
        write_value(writer, k, v)?;
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn primitive_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// First child element with the given local name
pub(crate) fn child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// All child elements with the given local name
pub(crate) fn children<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// `value` attribute of the named child, trimmed and non-empty
pub(crate) fn child_value<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name)
        .and_then(|n| n.attribute("value"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Drop any log text before the first `<`
pub(crate) fn strip_prefix(raw: &str) -> Option<&str> {
    raw.find('<').map(|idx| &raw[idx..])
}
