//! Request and response values owned by a server session.

use std::collections::HashMap;

use crate::trace::TraceContext;

/// Request method verb. Exact-match routing only ever compares these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
}

impl Method {
    pub fn parse(s: &str) -> Option<Method> {
        match s {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            "OPTIONS" => Some(Method::Options),
            "PATCH" => Some(Method::Patch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
        }
    }
}

/// HTTP protocol version, echoed back in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// A decoded inbound request.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub version: Version,
    /// Raw request target, as received.
    pub target: String,
    /// Target before the first `?`.
    pub path: String,
    /// Query parameters; duplicate keys keep the first occurrence.
    pub query: HashMap<String, String>,
    /// Raw header name/value pairs in arrival order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Effective trace context: adopted from `traceparent` or a new root.
    pub trace: TraceContext,
    /// Whether the connection should be kept open after the response.
    pub keep_alive: bool,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: Method::Get,
            version: Version::Http11,
            target: String::new(),
            path: String::new(),
            query: HashMap::new(),
            headers: Vec::new(),
            body: Vec::new(),
            trace: TraceContext::default(),
            keep_alive: true,
        }
    }
}

impl Request {
    /// First-wins query parameter value; empty when absent.
    pub fn query(&self, key: &str) -> &str {
        self.query.get(key).map(String::as_str).unwrap_or("")
    }

    /// Case-insensitive header lookup, first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The response a handler fills in.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    /// Application headers; overlaid last onto the framework headers, so
    /// they win on collision.
    pub headers: HashMap<String, String>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: Vec::new(),
            headers: HashMap::new(),
        }
    }
}

impl Response {
    /// Set a JSON body and the matching content type.
    pub fn set_json(&mut self, json: impl Into<String>) {
        self.content_type = "application/json; charset=utf-8".to_string();
        self.body = json.into().into_bytes();
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }
}
