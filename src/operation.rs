//! Operation metadata supplied by generated bindings.
//!
//! Each generated operation hands the client one of these records; the
//! request builder and response decoder are entirely driven by it. Field
//! bindings are `(wire_name, field_name)` pairs resolved against the input
//! or output shape.

/// Describes one service operation to the core runtime.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    /// Operation name, e.g. `DescribeTable`.
    pub name: String,
    /// HTTP method.
    pub method: http::Method,
    /// Path template; `{name}` segments percent-encode the value,
    /// `{name+}` segments keep slashes unescaped.
    pub request_uri: String,
    /// Input fields bound to request headers.
    pub header_params: Vec<(String, String)>,
    /// Input fields bound to the query string.
    pub query_params: Vec<(String, String)>,
    /// Input fields substituted into the path template.
    pub path_params: Vec<(String, String)>,
    /// Input/output member that IS the body, if one is designated.
    pub payload_member: Option<String>,
    /// Whether the output payload member receives the raw response bytes.
    pub raw_payload: bool,
    /// Response headers merged into output members.
    pub response_headers: Vec<(String, String)>,
    /// Output member receiving the HTTP status code, if declared.
    pub status_code_member: Option<String>,
}

impl OperationDescriptor {
    pub fn new(name: impl Into<String>, method: http::Method, request_uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            request_uri: request_uri.into(),
            header_params: Vec::new(),
            query_params: Vec::new(),
            path_params: Vec::new(),
            payload_member: None,
            raw_payload: false,
            response_headers: Vec::new(),
            status_code_member: None,
        }
    }

    pub fn with_header_params(
        mut self,
        params: impl IntoIterator<Item = (&'static str, &'static str)>,
    ) -> Self {
        self.header_params = own_pairs(params);
        self
    }

    pub fn with_query_params(
        mut self,
        params: impl IntoIterator<Item = (&'static str, &'static str)>,
    ) -> Self {
        self.query_params = own_pairs(params);
        self
    }

    pub fn with_path_params(
        mut self,
        params: impl IntoIterator<Item = (&'static str, &'static str)>,
    ) -> Self {
        self.path_params = own_pairs(params);
        self
    }

    pub fn with_payload_member(mut self, member: impl Into<String>) -> Self {
        self.payload_member = Some(member.into());
        self
    }

    pub fn with_raw_payload(mut self) -> Self {
        self.raw_payload = true;
        self
    }

    pub fn with_response_headers(
        mut self,
        params: impl IntoIterator<Item = (&'static str, &'static str)>,
    ) -> Self {
        self.response_headers = own_pairs(params);
        self
    }

    pub fn with_status_code_member(mut self, member: impl Into<String>) -> Self {
        self.status_code_member = Some(member.into());
        self
    }
}

fn own_pairs(
    pairs: impl IntoIterator<Item = (&'static str, &'static str)>,
) -> Vec<(String, String)> {
    pairs
        .into_iter()
        .map(|(wire, field)| (wire.to_string(), field.to_string()))
        .collect()
}
