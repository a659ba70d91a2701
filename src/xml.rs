//! XML encoding and decoding for the REST-XML and query dialects.
//!
//! Request bodies are produced with the `quick-xml` event writer; response
//! bodies and error documents are read back into a [`ShapeValue`] tree.
//! Lists serialize as repeated `<member>` elements inside the field
//! element.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use std::io::Cursor;

use crate::shape::ShapeValue;

// ── Encoding ────────────────────────────────────────────────────────

/// Encode a shape as an XML document rooted at `root`.
pub fn encode_shape(
    root: &str,
    namespace: Option<&str>,
    shape: &ShapeValue,
) -> Result<String, String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| e.to_string())?;

    let mut start = BytesStart::new(root);
    if let Some(ns) = namespace {
        start.push_attribute(("xmlns", ns));
    }
    writer
        .write_event(Event::Start(start))
        .map_err(|e| e.to_string())?;

    match shape {
        ShapeValue::Struct(fields) => {
            for (name, value) in fields {
                write_value(&mut writer, name, value)?;
            }
        }
        other => write_text(&mut writer, other)?,
    }

    writer
        .write_event(Event::End(BytesEnd::new(root)))
        .map_err(|e| e.to_string())?;

    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| e.to_string())
}

fn write_value(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    value: &ShapeValue,
) -> Result<(), String> {
    match value {
        ShapeValue::Null => Ok(()),
        ShapeValue::Struct(fields) => {
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(|e| e.to_string())?;
            for (child, child_value) in fields {
                write_value(writer, child, child_value)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(|e| e.to_string())
        }
        ShapeValue::List(items) => {
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(|e| e.to_string())?;
            for item in items {
                write_value(writer, "member", item)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(|e| e.to_string())
        }
        scalar => write_text_element(writer, name, scalar),
    }
}

/// Write a `<tag>text</tag>` element.
fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    tag: &str,
    value: &ShapeValue,
) -> Result<(), String> {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(|e| e.to_string())?;
    write_text(writer, value)?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(|e| e.to_string())
}

fn write_text(writer: &mut Writer<Cursor<Vec<u8>>>, value: &ShapeValue) -> Result<(), String> {
    let text = match value {
        ShapeValue::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        other => other.as_wire_string().unwrap_or_default(),
    };
    writer
        .write_event(Event::Text(BytesText::new(&text)))
        .map_err(|e| e.to_string())
}

// ── Decoding ────────────────────────────────────────────────────────

/// Parse an XML document and return the contents of its root element.
///
/// Elements with children become `Struct`; repeated child names, and
/// elements whose children are all named `member`, become `List`; leaves
/// become `Str`.
pub fn parse_document(bytes: &[u8]) -> Result<ShapeValue, String> {
    struct Node {
        name: String,
        text: String,
        children: Vec<(String, ShapeValue)>,
    }

    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);

    let mut stack: Vec<Node> = vec![Node {
        name: String::new(),
        text: String::new(),
        children: Vec::new(),
    }];
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                stack.push(Node {
                    name,
                    text: String::new(),
                    children: Vec::new(),
                });
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push((name, ShapeValue::Str(String::new())));
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| e.to_string())?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                let node = stack.pop().ok_or("unbalanced end tag")?;
                let value = if node.children.is_empty() {
                    ShapeValue::Str(node.text)
                } else {
                    collect_children(node.children)
                };
                let parent = stack.last_mut().ok_or("unbalanced end tag")?;
                parent.children.push((node.name, value));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("malformed XML: {e}")),
        }
        buf.clear();
    }

    let root = stack.pop().ok_or("empty document")?;
    match root.children.into_iter().next() {
        Some((_, value)) => Ok(value),
        None => Err("empty document".to_string()),
    }
}

fn collect_children(children: Vec<(String, ShapeValue)>) -> ShapeValue {
    // All children named `member` is the list encoding.
    if children.iter().all(|(name, _)| name == "member") {
        return ShapeValue::List(children.into_iter().map(|(_, v)| v).collect());
    }

    let mut fields: BTreeMap<String, ShapeValue> = BTreeMap::new();
    for (name, value) in children {
        match fields.remove(&name) {
            None => {
                fields.insert(name, value);
            }
            // Repeated sibling names fold into a list.
            Some(ShapeValue::List(mut items)) => {
                items.push(value);
                fields.insert(name, ShapeValue::List(items));
            }
            Some(existing) => {
                fields.insert(name, ShapeValue::List(vec![existing, value]));
            }
        }
    }
    ShapeValue::Struct(fields)
}

// ── Error documents ─────────────────────────────────────────────────

/// Extract `(Code, Message)` from an AWS XML error document.
///
/// Handles both the query-dialect wrapper (`/ErrorResponse/Error/...`) and
/// the bare REST-XML form (`/Error/...`).
pub fn extract_error_fields(bytes: &[u8]) -> Option<(String, String)> {
    let doc = parse_document(bytes).ok()?;
    let error = match doc.get("Error") {
        Some(inner) => inner,
        None => &doc,
    };
    let code = error.get("Code")?.as_str()?.to_string();
    let message = error
        .get("Message")
        .and_then(ShapeValue::as_str)
        .unwrap_or("")
        .to_string();
    Some((code, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scalar_fields() {
        let shape = ShapeValue::structure([
            ("Name", ShapeValue::str("bucket")),
            ("Quiet", ShapeValue::Bool(true)),
        ]);
        let xml = encode_shape("CreateBucketRequest", None, &shape).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<Name>bucket</Name>"));
        assert!(xml.contains("<Quiet>true</Quiet>"));
    }

    #[test]
    fn test_encode_with_namespace() {
        let shape = ShapeValue::structure([("K", ShapeValue::str("v"))]);
        let xml = encode_shape("Doc", Some("http://example.com/doc/2011-01-01/"), &shape).unwrap();
        assert!(xml.contains("<Doc xmlns=\"http://example.com/doc/2011-01-01/\">"));
    }

    #[test]
    fn test_encode_escapes_text() {
        let shape = ShapeValue::structure([("V", ShapeValue::str("a<b&c"))]);
        let xml = encode_shape("Doc", None, &shape).unwrap();
        assert!(xml.contains("<V>a&lt;b&amp;c</V>"));
    }

    #[test]
    fn test_roundtrip_scalars() {
        let shape = ShapeValue::structure([
            ("Alpha", ShapeValue::str("one")),
            ("Beta", ShapeValue::str("two words")),
            (
                "Nested",
                ShapeValue::structure([("Inner", ShapeValue::str("deep"))]),
            ),
        ]);
        let xml = encode_shape("Doc", None, &shape).unwrap();
        let parsed = parse_document(xml.as_bytes()).unwrap();
        assert_eq!(parsed, shape);
    }

    #[test]
    fn test_roundtrip_list() {
        let shape = ShapeValue::structure([(
            "Items",
            ShapeValue::List(vec![ShapeValue::str("a"), ShapeValue::str("b")]),
        )]);
        let xml = encode_shape("Doc", None, &shape).unwrap();
        assert!(xml.contains("<Items><member>a</member><member>b</member></Items>"));
        let parsed = parse_document(xml.as_bytes()).unwrap();
        assert_eq!(parsed, shape);
    }

    #[test]
    fn test_parse_repeated_siblings_fold_to_list() {
        let xml = "<Doc><Item>a</Item><Item>b</Item><Other>c</Other></Doc>";
        let parsed = parse_document(xml.as_bytes()).unwrap();
        assert_eq!(
            parsed.get("Item").unwrap(),
            &ShapeValue::List(vec![ShapeValue::str("a"), ShapeValue::str("b")])
        );
        assert_eq!(parsed.get("Other").unwrap(), &ShapeValue::str("c"));
    }

    #[test]
    fn test_extract_error_query_wrapper() {
        let xml = "<ErrorResponse><Error><Code>Throttling</Code><Message>slow down</Message></Error><RequestId>r</RequestId></ErrorResponse>";
        let (code, message) = extract_error_fields(xml.as_bytes()).unwrap();
        assert_eq!(code, "Throttling");
        assert_eq!(message, "slow down");
    }

    #[test]
    fn test_extract_error_rest_xml() {
        let xml = "<Error><Code>NoSuchBucket</Code><Message>The specified bucket does not exist</Message></Error>";
        let (code, message) = extract_error_fields(xml.as_bytes()).unwrap();
        assert_eq!(code, "NoSuchBucket");
        assert_eq!(message, "The specified bucket does not exist");
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        assert!(parse_document(b"<Doc><Unclosed></Doc>").is_err());
        assert!(extract_error_fields(b"not xml at all").is_none());
    }
}
