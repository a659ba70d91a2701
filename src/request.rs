//! Wire request construction.
//!
//! Turns an operation descriptor plus an input shape into a concrete HTTP
//! request: path templating, query and header binding, and the body
//! encoding for each of the four dialects. `Host` is left for the signer;
//! everything else the request needs is set here.

use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::BTreeSet;
use url::Url;

use crate::body::Body;
use crate::config::{Protocol, ServiceConfig};
use crate::errors::{AwsError, ClientError};
use crate::operation::OperationDescriptor;
use crate::shape::ShapeValue;
use crate::xml;

/// Unreserved characters only; everything else is percent-encoded.
const STRICT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// As strict, but slashes survive; used for `{name+}` path segments.
const GREEDY_PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// A built, not-yet-signed HTTP request.
#[derive(Debug, Clone)]
pub struct AwsRequest {
    pub method: http::Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Build the wire request for `op` from `input`.
pub fn build_request(
    op: &OperationDescriptor,
    config: &ServiceConfig,
    input: Option<&ShapeValue>,
) -> Result<AwsRequest, AwsError> {
    let mut url = config.resolve_endpoint()?;

    let path = substitute_path(&op.request_uri, op, input)?;
    url.set_path(&path);

    let query = build_query_string(op, input);
    if !query.is_empty() {
        url.set_query(Some(&query));
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("cumulo/", env!("CARGO_PKG_VERSION"))),
    );

    for (wire_name, field) in &op.header_params {
        if let Some(value) = bound_value(input, field) {
            let name: http::header::HeaderName = wire_name
                .parse()
                .map_err(|_| ClientError::InvalidHeader(wire_name.clone()))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|_| ClientError::InvalidHeader(wire_name.clone()))?;
            headers.insert(name, value);
        }
    }

    if let (Protocol::Json { .. }, Some(prefix)) = (&config.protocol, &config.target_prefix) {
        let target = format!("{prefix}.{}", op.name);
        headers.insert(
            "x-amz-target",
            HeaderValue::from_str(&target)
                .map_err(|_| ClientError::InvalidHeader("x-amz-target".into()))?,
        );
    }

    let body = build_body(op, config, input)?;
    if !body.is_empty() {
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&config.protocol.content_type())
                .map_err(|_| ClientError::InvalidHeader("content-type".into()))?,
        );
    }

    Ok(AwsRequest {
        method: op.method.clone(),
        url,
        headers,
        body,
    })
}

// ── Path templating ─────────────────────────────────────────────────

/// Replace `{name}` and `{name+}` placeholders. The `+` form keeps slashes
/// in the substituted value unescaped.
fn substitute_path(
    template: &str,
    op: &OperationDescriptor,
    input: Option<&ShapeValue>,
) -> Result<String, ClientError> {
    let mut path = template.to_string();
    for (wire_name, field) in &op.path_params {
        let value = bound_value(input, field)
            .ok_or_else(|| ClientError::MissingPathParameter(wire_name.clone()))?;

        let greedy = format!("{{{wire_name}+}}");
        let plain = format!("{{{wire_name}}}");
        if path.contains(&greedy) {
            let encoded = utf8_percent_encode(&value, GREEDY_PATH_ENCODE_SET).to_string();
            path = path.replace(&greedy, &encoded);
        } else {
            let encoded = utf8_percent_encode(&value, STRICT_ENCODE_SET).to_string();
            path = path.replace(&plain, &encoded);
        }
    }
    Ok(path)
}

// ── Query string ────────────────────────────────────────────────────

/// Assemble the query string from the operation's query bindings, sorted
/// by key so the emitted bytes already match the canonical form the
/// service recomputes during signature verification.
fn build_query_string(op: &OperationDescriptor, input: Option<&ShapeValue>) -> String {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (wire_name, field) in &op.query_params {
        if let Some(value) = bound_value(input, field) {
            pairs.push((wire_name.clone(), value));
        }
    }
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, STRICT_ENCODE_SET),
                utf8_percent_encode(v, STRICT_ENCODE_SET),
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

// ── Body encoding ───────────────────────────────────────────────────

fn build_body(
    op: &OperationDescriptor,
    config: &ServiceConfig,
    input: Option<&ShapeValue>,
) -> Result<Body, AwsError> {
    if config.protocol.is_query_like() {
        let ec2 = config.protocol == Protocol::Ec2;
        return Ok(Body::Text(encode_query_body(op, config, input, ec2)));
    }

    let Some(input) = input else {
        return Ok(Body::Empty);
    };

    // A designated payload member IS the body.
    if let Some(member) = &op.payload_member {
        return match input.get(member) {
            None | Some(ShapeValue::Null) => Ok(Body::Empty),
            Some(ShapeValue::Str(text)) => Ok(Body::Text(text.clone())),
            Some(ShapeValue::Blob(bytes)) => Ok(Body::Bytes(bytes.clone())),
            Some(value) => match &config.protocol {
                Protocol::RestXml => {
                    let doc = xml::encode_shape(member, config.xml_namespace.as_deref(), value)
                        .map_err(AwsError::Protocol)?;
                    Ok(Body::Xml(doc))
                }
                _ => {
                    let json = value.to_json().map_err(AwsError::Protocol)?;
                    Ok(Body::Json(serde_json::to_vec(&json)
                        .map_err(|e| AwsError::Protocol(e.to_string()))?
                        .into()))
                }
            },
        };
    }

    // Otherwise the shape minus its header/query/path bindings is encoded
    // whole. JSON RPC always carries a body, even an empty one; the REST
    // dialects omit it when nothing is left to send.
    let remaining = unbound_fields(op, input);
    let remaining_empty = matches!(&remaining, ShapeValue::Struct(fields) if fields.is_empty());
    if remaining_empty && !matches!(config.protocol, Protocol::Json { .. }) {
        return Ok(Body::Empty);
    }

    match &config.protocol {
        Protocol::RestXml => {
            let root = format!("{}Request", op.name);
            let doc = xml::encode_shape(&root, config.xml_namespace.as_deref(), &remaining)
                .map_err(AwsError::Protocol)?;
            Ok(Body::Xml(doc))
        }
        _ => {
            let json = remaining.to_json().map_err(AwsError::Protocol)?;
            Ok(Body::Json(
                serde_json::to_vec(&json)
                    .map_err(|e| AwsError::Protocol(e.to_string()))?
                    .into(),
            ))
        }
    }
}

/// The input struct with header/query/path-bound members removed.
fn unbound_fields(op: &OperationDescriptor, input: &ShapeValue) -> ShapeValue {
    let bound: BTreeSet<&str> = op
        .header_params
        .iter()
        .chain(&op.query_params)
        .chain(&op.path_params)
        .map(|(_, field)| field.as_str())
        .collect();

    match input {
        ShapeValue::Struct(fields) => ShapeValue::Struct(
            fields
                .iter()
                .filter(|(name, _)| !bound.contains(name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Form-encode a shape for the query and ec2 dialects.
///
/// `Action` and `Version` are always present; keys sort
/// ASCII-lexicographically. Lists flatten as `Name.member.N` for the query
/// dialect and `Name.N` for ec2, 1-based.
fn encode_query_body(
    op: &OperationDescriptor,
    config: &ServiceConfig,
    input: Option<&ShapeValue>,
    ec2: bool,
) -> String {
    let mut pairs: Vec<(String, String)> = vec![
        ("Action".to_string(), op.name.clone()),
        ("Version".to_string(), config.api_version.clone()),
    ];

    if let Some(input) = input {
        flatten_query_value("", &unbound_fields(op, input), ec2, &mut pairs);
    }

    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", utf8_percent_encode(v, STRICT_ENCODE_SET)))
        .collect::<Vec<_>>()
        .join("&")
}

fn flatten_query_value(
    prefix: &str,
    value: &ShapeValue,
    ec2: bool,
    out: &mut Vec<(String, String)>,
) {
    match value {
        ShapeValue::Null | ShapeValue::Blob(_) => {}
        ShapeValue::Struct(fields) => {
            for (name, child) in fields {
                let key = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                flatten_query_value(&key, child, ec2, out);
            }
        }
        ShapeValue::List(items) => {
            for (i, item) in items.iter().enumerate() {
                let key = if ec2 {
                    format!("{prefix}.{}", i + 1)
                } else {
                    format!("{prefix}.member.{}", i + 1)
                };
                flatten_query_value(&key, item, ec2, out);
            }
        }
        scalar => {
            if let Some(text) = scalar.as_wire_string() {
                out.push((prefix.to_string(), text));
            }
        }
    }
}

fn bound_value(input: Option<&ShapeValue>, field: &str) -> Option<String> {
    input
        .and_then(|shape| shape.get(field))
        .and_then(ShapeValue::as_wire_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_config() -> ServiceConfig {
        ServiceConfig::new("us-east-1", "sns", Protocol::Query, "2011-01-01")
    }

    #[test]
    fn test_query_dialect_body_sorted() {
        let op = OperationDescriptor::new("DoThing", http::Method::POST, "/");
        let input = ShapeValue::structure([
            ("A", ShapeValue::str("x y")),
            ("B", ShapeValue::Int(1)),
        ]);

        let request = build_request(&op, &query_config(), Some(&input)).unwrap();
        assert_eq!(
            request.body,
            Body::Text("A=x%20y&Action=DoThing&B=1&Version=2011-01-01".to_string())
        );
        assert_eq!(
            request.headers.get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded; charset=utf-8"
        );
    }

    #[test]
    fn test_query_dialect_roundtrips_scalars() {
        let op = OperationDescriptor::new("DoThing", http::Method::POST, "/");
        let input = ShapeValue::structure([
            ("Name", ShapeValue::str("first second")),
            ("Count", ShapeValue::Int(42)),
            ("Flag", ShapeValue::Bool(true)),
        ]);

        let request = build_request(&op, &query_config(), Some(&input)).unwrap();
        let Body::Text(body) = &request.body else {
            panic!("query body must be text");
        };

        // Parse the form encoding back and compare the field values.
        let mut decoded = std::collections::BTreeMap::new();
        for pair in body.split('&') {
            let (k, v) = pair.split_once('=').unwrap();
            decoded.insert(
                k.to_string(),
                percent_encoding::percent_decode_str(v)
                    .decode_utf8()
                    .unwrap()
                    .into_owned(),
            );
        }
        assert_eq!(decoded["Name"], "first second");
        assert_eq!(decoded["Count"], "42");
        assert_eq!(decoded["Flag"], "true");
        assert_eq!(decoded["Action"], "DoThing");
        assert_eq!(decoded["Version"], "2011-01-01");
    }

    #[test]
    fn test_query_list_flattening_uses_member() {
        let op = OperationDescriptor::new("DoThing", http::Method::POST, "/");
        let input = ShapeValue::structure([(
            "Names",
            ShapeValue::List(vec![ShapeValue::str("a"), ShapeValue::str("b")]),
        )]);

        let request = build_request(&op, &query_config(), Some(&input)).unwrap();
        let Body::Text(body) = &request.body else {
            panic!()
        };
        assert!(body.contains("Names.member.1=a&Names.member.2=b"));
    }

    #[test]
    fn test_ec2_list_flattening_drops_member() {
        let config = ServiceConfig::new("us-east-1", "ec2", Protocol::Ec2, "2016-11-15");
        let op = OperationDescriptor::new("DescribeInstances", http::Method::POST, "/");
        let input = ShapeValue::structure([(
            "InstanceId",
            ShapeValue::List(vec![ShapeValue::str("i-1"), ShapeValue::str("i-2")]),
        )]);

        let request = build_request(&op, &config, Some(&input)).unwrap();
        let Body::Text(body) = &request.body else {
            panic!()
        };
        assert!(body.contains("InstanceId.1=i-1&InstanceId.2=i-2"));
        assert!(!body.contains("member"));
    }

    #[test]
    fn test_path_templating_plain_and_greedy() {
        let config = ServiceConfig::new("us-east-1", "s3", Protocol::RestXml, "2006-03-01");
        let op = OperationDescriptor::new("GetObject", http::Method::GET, "/{Bucket}/{Key+}")
            .with_path_params([("Bucket", "Bucket"), ("Key", "Key")]);
        let input = ShapeValue::structure([
            ("Bucket", ShapeValue::str("my-bucket")),
            ("Key", ShapeValue::str("a dir/file name.txt")),
        ]);

        let request = build_request(&op, &config, Some(&input)).unwrap();
        assert_eq!(
            request.url.path(),
            "/my-bucket/a%20dir/file%20name.txt"
        );
    }

    #[test]
    fn test_plain_path_param_encodes_slashes() {
        let config = ServiceConfig::new("us-east-1", "svc", Protocol::RestJson, "2020-01-01");
        let op = OperationDescriptor::new("Get", http::Method::GET, "/things/{Id}")
            .with_path_params([("Id", "Id")]);
        let input = ShapeValue::structure([("Id", ShapeValue::str("a/b"))]);

        let request = build_request(&op, &config, Some(&input)).unwrap();
        assert_eq!(request.url.path(), "/things/a%2Fb");
    }

    #[test]
    fn test_missing_path_param_fails() {
        let config = ServiceConfig::new("us-east-1", "svc", Protocol::RestJson, "2020-01-01");
        let op = OperationDescriptor::new("Get", http::Method::GET, "/things/{Id}")
            .with_path_params([("Id", "Id")]);

        let result = build_request(&op, &config, None);
        assert!(matches!(
            result,
            Err(AwsError::Client(ClientError::MissingPathParameter(_)))
        ));
    }

    #[test]
    fn test_header_and_query_binding() {
        let config = ServiceConfig::new("us-east-1", "svc", Protocol::RestJson, "2020-01-01");
        let op = OperationDescriptor::new("List", http::Method::GET, "/items")
            .with_header_params([("x-item-owner", "Owner")])
            .with_query_params([("limit", "Limit"), ("marker", "Marker")]);
        let input = ShapeValue::structure([
            ("Owner", ShapeValue::str("me")),
            ("Limit", ShapeValue::Int(10)),
        ]);

        let request = build_request(&op, &config, Some(&input)).unwrap();
        assert_eq!(request.headers.get("x-item-owner").unwrap(), "me");
        assert_eq!(request.url.query(), Some("limit=10"));
        // Bound fields never leak into the body.
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_json_dialect_body_and_target() {
        let config = ServiceConfig::new(
            "us-east-1",
            "dynamodb",
            Protocol::Json {
                version: "1.0".into(),
            },
            "2012-08-10",
        )
        .with_target_prefix("DynamoDB_20120810");
        let op = OperationDescriptor::new("DescribeTable", http::Method::POST, "/");
        let input = ShapeValue::structure([("TableName", ShapeValue::str("people"))]);

        let request = build_request(&op, &config, Some(&input)).unwrap();
        assert_eq!(
            request.headers.get("x-amz-target").unwrap(),
            "DynamoDB_20120810.DescribeTable"
        );
        assert_eq!(
            request.headers.get(CONTENT_TYPE).unwrap(),
            "application/x-amz-json-1.0"
        );
        let Body::Json(bytes) = &request.body else {
            panic!()
        };
        let json: serde_json::Value = serde_json::from_slice(bytes).unwrap();
        assert_eq!(json["TableName"], "people");
    }

    #[test]
    fn test_rest_xml_whole_shape_body() {
        let config = ServiceConfig::new("us-east-1", "s3", Protocol::RestXml, "2006-03-01")
            .with_xml_namespace("http://s3.amazonaws.com/doc/2006-03-01/");
        let op = OperationDescriptor::new("CreateBucket", http::Method::PUT, "/{Bucket}")
            .with_path_params([("Bucket", "Bucket")]);
        let input = ShapeValue::structure([
            ("Bucket", ShapeValue::str("b")),
            ("LocationConstraint", ShapeValue::str("eu-west-1")),
        ]);

        let request = build_request(&op, &config, Some(&input)).unwrap();
        let Body::Xml(doc) = &request.body else {
            panic!()
        };
        assert!(doc.contains("<CreateBucketRequest xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">"));
        assert!(doc.contains("<LocationConstraint>eu-west-1</LocationConstraint>"));
        // The path binding stays out of the document.
        assert!(!doc.contains("<Bucket>"));
    }

    #[test]
    fn test_payload_member_blob() {
        let config = ServiceConfig::new("us-east-1", "s3", Protocol::RestXml, "2006-03-01");
        let op = OperationDescriptor::new("PutObject", http::Method::PUT, "/{Bucket}/{Key+}")
            .with_path_params([("Bucket", "Bucket"), ("Key", "Key")])
            .with_payload_member("Body");
        let input = ShapeValue::structure([
            ("Bucket", ShapeValue::str("b")),
            ("Key", ShapeValue::str("k")),
            ("Body", ShapeValue::Blob(bytes::Bytes::from_static(b"raw"))),
        ]);

        let request = build_request(&op, &config, Some(&input)).unwrap();
        assert_eq!(request.body, Body::Bytes(bytes::Bytes::from_static(b"raw")));
    }

    #[test]
    fn test_user_agent_always_present() {
        let op = OperationDescriptor::new("DoThing", http::Method::POST, "/");
        let request = build_request(&op, &query_config(), None).unwrap();
        let agent = request.headers.get(USER_AGENT).unwrap().to_str().unwrap();
        assert!(agent.starts_with("cumulo/"));
    }
}
