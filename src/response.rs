//! Wire response decoding.
//!
//! On 2xx the body is decoded by dialect into a [`ShapeValue`], response
//! headers named by the operation are merged in, and a synthetic status
//! code member is set when the output declares one. On non-2xx the error
//! code and message are extracted per dialect and matched against the
//! error taxonomy.

use http::header::HeaderMap;

use crate::config::{Protocol, ServiceConfig};
use crate::errors::{AwsError, ServiceError, CLIENT_ERROR_CODES, SERVER_ERROR_CODES};
use crate::operation::OperationDescriptor;
use crate::shape::ShapeValue;
use crate::transport::AwsHttpResponse;
use crate::xml;

/// Decode a successful (2xx) response into the output shape.
///
/// Returns `None` when the operation produces no output at all.
pub fn decode_response(
    op: &OperationDescriptor,
    config: &ServiceConfig,
    response: &AwsHttpResponse,
) -> Result<Option<ShapeValue>, AwsError> {
    let mut output = if op.raw_payload {
        let member = op.payload_member.as_deref().unwrap_or("Body");
        ShapeValue::structure([(member, ShapeValue::Blob(response.body.clone()))])
    } else if response.body.is_empty() {
        ShapeValue::Struct(std::collections::BTreeMap::new())
    } else {
        decode_body(config, &response.body)?
    };

    merge_response_headers(op, &response.headers, &mut output);

    if let (Some(member), ShapeValue::Struct(fields)) = (&op.status_code_member, &mut output) {
        fields.insert(
            member.clone(),
            ShapeValue::Int(i64::from(response.status.as_u16())),
        );
    }

    match &output {
        ShapeValue::Struct(fields) if fields.is_empty() => Ok(None),
        _ => Ok(Some(output)),
    }
}

fn decode_body(config: &ServiceConfig, body: &[u8]) -> Result<ShapeValue, AwsError> {
    match &config.protocol {
        Protocol::Json { .. } | Protocol::RestJson => {
            let json: serde_json::Value = serde_json::from_slice(body)
                .map_err(|e| AwsError::Protocol(format!("invalid JSON body: {e}")))?;
            Ok(ShapeValue::from_json(&json))
        }
        Protocol::RestXml | Protocol::Query | Protocol::Ec2 => xml::parse_document(body)
            .map_err(|e| AwsError::Protocol(format!("invalid XML body: {e}"))),
    }
}

/// Merge response headers into output members; header name matching is
/// case-insensitive.
fn merge_response_headers(op: &OperationDescriptor, headers: &HeaderMap, output: &mut ShapeValue) {
    let ShapeValue::Struct(fields) = output else {
        return;
    };
    for (wire_name, field) in &op.response_headers {
        if let Some(value) = headers.get(wire_name.as_str()).and_then(|v| v.to_str().ok()) {
            fields.insert(field.clone(), ShapeValue::str(value));
        }
    }
}

// ── Error decoding ──────────────────────────────────────────────────

/// Decode a non-2xx response into a [`ServiceError`].
pub fn decode_error(config: &ServiceConfig, response: &AwsHttpResponse) -> ServiceError {
    let status = response.status.as_u16();

    let extracted = match &config.protocol {
        Protocol::Query | Protocol::Ec2 | Protocol::RestXml => {
            xml::extract_error_fields(&response.body)
        }
        Protocol::RestJson => extract_rest_json_error(&response.headers, &response.body),
        Protocol::Json { .. } => extract_json_error(&response.body),
    };

    let Some((raw_code, message)) = extracted else {
        return ServiceError::Unhandled {
            status,
            raw_body: String::from_utf8_lossy(&response.body).into_owned(),
        };
    };

    let code = raw_code.strip_suffix("Exception").unwrap_or(&raw_code);

    if config.possible_error_types.iter().any(|c| c == code) {
        ServiceError::Service {
            code: code.to_string(),
            message,
            status,
        }
    } else if CLIENT_ERROR_CODES.contains(&code) {
        ServiceError::Client {
            code: code.to_string(),
            message,
            status,
        }
    } else if SERVER_ERROR_CODES.contains(&code) {
        ServiceError::Server {
            code: code.to_string(),
            message,
            status,
        }
    } else {
        ServiceError::Response {
            code: code.to_string(),
            message,
            status,
        }
    }
}

/// REST-JSON: code from the `x-amzn-ErrorType` header (suffix after `:`
/// dropped), falling back to the body `__type`/`code` fields; message from
/// a body field named `message`, case-insensitively.
fn extract_rest_json_error(headers: &HeaderMap, body: &[u8]) -> Option<(String, String)> {
    let json: Option<serde_json::Value> = serde_json::from_slice(body).ok();

    let header_code = headers
        .get("x-amzn-errortype")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(':').next().unwrap_or(v).to_string());

    let code = header_code.or_else(|| {
        let json = json.as_ref()?;
        let raw = json
            .get("__type")
            .or_else(|| json.get("code"))
            .and_then(|v| v.as_str())?;
        Some(strip_type_namespace(raw))
    })?;

    let message = json
        .as_ref()
        .and_then(|json| case_insensitive_field(json, "message"))
        .unwrap_or_default();
    Some((code, message))
}

/// JSON RPC: code from the body `__type` with its `...#` namespace prefix
/// dropped; message as above.
fn extract_json_error(body: &[u8]) -> Option<(String, String)> {
    let json: serde_json::Value = serde_json::from_slice(body).ok()?;
    let raw = json.get("__type").and_then(|v| v.as_str())?;
    let code = strip_type_namespace(raw);
    let message = case_insensitive_field(&json, "message").unwrap_or_default();
    Some((code, message))
}

fn strip_type_namespace(raw: &str) -> String {
    match raw.rsplit_once('#') {
        Some((_, code)) => code.to_string(),
        None => raw.to_string(),
    }
}

fn case_insensitive_field(json: &serde_json::Value, name: &str) -> Option<String> {
    let object = json.as_object()?;
    object
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value.as_str())
        .map(str::to_string)
}
