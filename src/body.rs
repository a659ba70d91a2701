//! Tagged request/response body.
//!
//! The builder produces one of these per request; the signer and transport
//! only ever see the contiguous-buffer view.

use bytes::Bytes;

/// A wire body in one of the protocol representations.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    /// Plain text payload.
    Text(String),
    /// Opaque binary payload.
    Bytes(Bytes),
    /// Serialized JSON document.
    Json(Bytes),
    /// Serialized XML document.
    Xml(String),
}

impl Body {
    /// View the body as a single contiguous buffer for hashing and
    /// transmission. `Empty` has no buffer.
    pub fn as_bytes(&self) -> Option<Bytes> {
        match self {
            Body::Empty => None,
            Body::Text(text) => Some(Bytes::copy_from_slice(text.as_bytes())),
            Body::Bytes(bytes) | Body::Json(bytes) => Some(bytes.clone()),
            Body::Xml(xml) => Some(Bytes::copy_from_slice(xml.as_bytes())),
        }
    }

    /// Wrap an opaque buffer.
    pub fn from_bytes(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_roundtrip_is_identity() {
        let original = Bytes::from_static(b"\x00\x01binary\xffpayload");
        let body = Body::from_bytes(original.clone());
        assert_eq!(body.as_bytes().unwrap(), original);
    }

    #[test]
    fn test_empty_has_no_buffer() {
        assert!(Body::Empty.as_bytes().is_none());
    }

    #[test]
    fn test_text_and_xml_views() {
        assert_eq!(
            Body::Text("hello".into()).as_bytes().unwrap(),
            Bytes::from_static(b"hello")
        );
        assert_eq!(
            Body::Xml("<a/>".into()).as_bytes().unwrap(),
            Bytes::from_static(b"<a/>")
        );
    }
}
