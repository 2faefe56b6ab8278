//! HTTP/1.1 wire parsing and serialization.
//!
//! The request parser follows the incremental contract used throughout the
//! codebase: feed it the receive buffer, get back either a decoded message
//! plus the number of bytes consumed, `Incomplete` when more input is
//! needed, or `Invalid` when the peer sent something unusable.

use std::collections::HashMap;

use bytes::BytesMut;

use crate::http::types::{Method, Request, Response, Version};
use crate::trace::TraceContext;

/// Upper bound on the request head; anything larger is rejected outright.
const MAX_HEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// More input is needed before a full message can be decoded.
    Incomplete,
    /// The input can never become a valid message.
    Invalid(&'static str),
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_version(s: &str) -> Option<Version> {
    match s {
        "HTTP/1.1" => Some(Version::Http11),
        "HTTP/1.0" => Some(Version::Http10),
        _ => None,
    }
}

/// Target substring before the first `?`.
pub fn extract_path(target: &str) -> &str {
    match target.find('?') {
        Some(q) => &target[..q],
        None => target,
    }
}

/// Split the query string on `&` then `=`. Duplicate keys keep the first
/// occurrence; an empty value is preserved.
pub fn parse_query(target: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Some(q) = target.find('?') else {
        return out;
    };
    for part in target[q + 1..].split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = match part.find('=') {
            Some(eq) => (&part[..eq], &part[eq + 1..]),
            None => (part, ""),
        };
        out.entry(key.to_string()).or_insert_with(|| value.to_string());
    }
    out
}

/// Try to decode one request from the front of `buf`. On success returns the
/// request and the number of bytes it occupied.
pub fn parse_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let head_end = match find_head_end(buf) {
        Some(pos) => pos,
        None => {
            if buf.len() > MAX_HEAD_BYTES {
                return Err(ParseError::Invalid("request head too large"));
            }
            return Err(ParseError::Incomplete);
        }
    };
    if head_end > MAX_HEAD_BYTES {
        return Err(ParseError::Invalid("request head too large"));
    }

    let head =
        std::str::from_utf8(&buf[..head_end]).map_err(|_| ParseError::Invalid("head not utf-8"))?;
    let mut lines = head.split("\r\n");

    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split(' ');
    let (method_s, target, version_s) = match (parts.next(), parts.next(), parts.next(), parts.next())
    {
        (Some(m), Some(t), Some(v), None) if !m.is_empty() && !t.is_empty() => (m, t, v),
        _ => return Err(ParseError::Invalid("malformed request line")),
    };

    let method = Method::parse(method_s).ok_or(ParseError::Invalid("unsupported method"))?;
    let version = parse_version(version_s).ok_or(ParseError::Invalid("unsupported version"))?;

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in lines {
        let colon = line.find(':').ok_or(ParseError::Invalid("malformed header"))?;
        let name = line[..colon].trim();
        let value = line[colon + 1..].trim();
        if name.is_empty() {
            return Err(ParseError::Invalid("malformed header"));
        }
        headers.push((name.to_string(), value.to_string()));
    }

    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };

    if header("transfer-encoding").is_some() {
        return Err(ParseError::Invalid("transfer-encoding not supported"));
    }

    let content_length = match header("content-length") {
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| ParseError::Invalid("bad content-length"))?,
        None => 0,
    };

    let body_start = head_end + 4;
    let total = body_start + content_length;
    if buf.len() < total {
        return Err(ParseError::Incomplete);
    }

    let keep_alive = match version {
        Version::Http11 => !matches!(header("connection"), Some(v) if v.eq_ignore_ascii_case("close")),
        Version::Http10 => {
            matches!(header("connection"), Some(v) if v.eq_ignore_ascii_case("keep-alive"))
        }
    };

    let req = Request {
        method,
        version,
        target: target.to_string(),
        path: String::new(),
        query: HashMap::new(),
        headers,
        body: buf[body_start..total].to_vec(),
        trace: TraceContext::default(),
        keep_alive,
    };

    Ok((req, total))
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    for (k, v) in headers.iter_mut() {
        if k.eq_ignore_ascii_case(name) {
            *v = value.to_string();
            return;
        }
    }
    headers.push((name.to_string(), value.to_string()));
}

/// Serialize a response message.
///
/// The framework headers go first (`Server`, `Content-Type`, `traceparent`,
/// `Connection` when needed); application headers are overlaid last so they
/// win on collision; the payload length is finalized at the end.
pub fn encode_response(
    version: Version,
    keep_alive: bool,
    resp: &Response,
    trace: &TraceContext,
    out: &mut BytesMut,
) {
    let mut headers: Vec<(String, String)> = Vec::with_capacity(resp.headers.len() + 4);
    headers.push(("Server".to_string(), "chmicro/0.1".to_string()));
    headers.push(("Content-Type".to_string(), resp.content_type.clone()));
    headers.push(("traceparent".to_string(), trace.to_traceparent()));
    match (version, keep_alive) {
        (Version::Http11, false) => set_header(&mut headers, "Connection", "close"),
        (Version::Http10, true) => set_header(&mut headers, "Connection", "keep-alive"),
        _ => {}
    }
    for (name, value) in &resp.headers {
        set_header(&mut headers, name, value);
    }
    set_header(&mut headers, "Content-Length", &resp.body.len().to_string());

    out.extend_from_slice(version.as_str().as_bytes());
    out.extend_from_slice(b" ");
    out.extend_from_slice(resp.status.to_string().as_bytes());
    out.extend_from_slice(b" ");
    out.extend_from_slice(reason_phrase(resp.status).as_bytes());
    out.extend_from_slice(b"\r\n");
    for (name, value) in &headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&resp.body);
}

/// Decoded head of an inbound response (client side).
#[derive(Debug)]
pub struct ResponseHead {
    pub status: u16,
    pub content_type: String,
    pub content_length: Option<usize>,
    /// Offset of the first body byte.
    pub body_start: usize,
}

/// Parse a response head from the front of `buf`.
pub fn parse_response_head(buf: &[u8]) -> Result<ResponseHead, ParseError> {
    let head_end = match find_head_end(buf) {
        Some(pos) => pos,
        None => {
            if buf.len() > MAX_HEAD_BYTES {
                return Err(ParseError::Invalid("response head too large"));
            }
            return Err(ParseError::Incomplete);
        }
    };

    let head =
        std::str::from_utf8(&buf[..head_end]).map_err(|_| ParseError::Invalid("head not utf-8"))?;
    let mut lines = head.split("\r\n");

    let status_line = lines.next().unwrap_or("");
    let mut parts = status_line.splitn(3, ' ');
    let (version_s, status_s) = match (parts.next(), parts.next()) {
        (Some(v), Some(s)) => (v, s),
        _ => return Err(ParseError::Invalid("malformed status line")),
    };
    if parse_version(version_s).is_none() {
        return Err(ParseError::Invalid("unsupported version"));
    }
    let status = status_s
        .parse::<u16>()
        .map_err(|_| ParseError::Invalid("bad status code"))?;

    let mut content_type = String::new();
    let mut content_length = None;
    for line in lines {
        let colon = line.find(':').ok_or(ParseError::Invalid("malformed header"))?;
        let name = line[..colon].trim();
        let value = line[colon + 1..].trim();
        if name.eq_ignore_ascii_case("content-type") {
            content_type = value.to_string();
        } else if name.eq_ignore_ascii_case("content-length") {
            content_length = Some(
                value
                    .parse::<usize>()
                    .map_err(|_| ParseError::Invalid("bad content-length"))?,
            );
        }
    }

    Ok(ResponseHead {
        status,
        content_type,
        content_length,
        body_start: head_end + 4,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_get() {
        let raw = b"GET /hello?name=ada HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, consumed) = parse_request(raw).unwrap();

        assert_eq!(consumed, raw.len());
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.version, Version::Http11);
        assert_eq!(req.target, "/hello?name=ada");
        assert!(req.keep_alive);
        assert!(req.body.is_empty());
        assert_eq!(req.header("host"), Some("localhost"));
    }

    #[test]
    fn partial_input_is_incomplete() {
        assert_eq!(
            parse_request(b"GET / HTTP/1.1\r\nHost: l").unwrap_err(),
            ParseError::Incomplete
        );
        // full head, short body
        let raw = b"POST /put HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        assert_eq!(parse_request(raw).unwrap_err(), ParseError::Incomplete);
    }

    #[test]
    fn parses_body_and_leaves_pipelined_bytes() {
        let raw = b"POST /put HTTP/1.1\r\nContent-Length: 4\r\n\r\nbodyGET /next";
        let (req, consumed) = parse_request(raw).unwrap();
        assert_eq!(req.body, b"body");
        assert_eq!(&raw[consumed..], b"GET /next");
    }

    #[test]
    fn connection_close_disables_keep_alive() {
        let raw = b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n";
        let (req, _) = parse_request(raw).unwrap();
        assert!(!req.keep_alive);

        let raw10 = b"GET / HTTP/1.0\r\n\r\n";
        let (req10, _) = parse_request(raw10).unwrap();
        assert!(!req10.keep_alive);

        let raw10_ka = b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n";
        let (req10_ka, _) = parse_request(raw10_ka).unwrap();
        assert!(req10_ka.keep_alive);
    }

    #[test]
    fn malformed_input_is_invalid() {
        assert!(matches!(
            parse_request(b"NONSENSE\r\n\r\n").unwrap_err(),
            ParseError::Invalid(_)
        ));
        assert!(matches!(
            parse_request(b"BREW / HTTP/1.1\r\n\r\n").unwrap_err(),
            ParseError::Invalid(_)
        ));
        assert!(matches!(
            parse_request(b"GET / HTTP/2.0\r\n\r\n").unwrap_err(),
            ParseError::Invalid(_)
        ));
        assert!(matches!(
            parse_request(b"GET / HTTP/1.1\r\nContent-Length: x\r\n\r\n").unwrap_err(),
            ParseError::Invalid(_)
        ));
    }

    #[test]
    fn path_extraction() {
        assert_eq!(extract_path("/get?key=k"), "/get");
        assert_eq!(extract_path("/get"), "/get");
        assert_eq!(extract_path("/?a=1"), "/");
    }

    #[test]
    fn query_first_occurrence_wins() {
        let q = parse_query("/x?a=1&a=2&b=&c");
        assert_eq!(q.get("a").map(String::as_str), Some("1"));
        assert_eq!(q.get("b").map(String::as_str), Some(""));
        assert_eq!(q.get("c").map(String::as_str), Some(""));
    }

    #[test]
    fn encodes_with_framework_headers_first_and_user_override() {
        let mut resp = Response::default();
        resp.body = b"ok".to_vec();
        resp.set_header("X-Extra", "1");
        resp.set_header("Server", "custom/2");

        let trace = TraceContext::new_root();
        let mut out = BytesMut::new();
        encode_response(Version::Http11, true, &resp, &trace, &mut out);

        let text = String::from_utf8(out.to_vec()).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Server: custom/2\r\n"));
        assert!(!text.contains("chmicro/0.1"));
        assert!(text.contains(&format!("traceparent: {}\r\n", trace.to_traceparent())));
        assert!(text.contains("X-Extra: 1\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\nok"));
    }

    #[test]
    fn encodes_connection_header_when_closing() {
        let resp = Response::default();
        let trace = TraceContext::new_root();

        let mut out = BytesMut::new();
        encode_response(Version::Http11, false, &resp, &trace, &mut out);
        assert!(String::from_utf8(out.to_vec())
            .unwrap()
            .contains("Connection: close\r\n"));

        let mut out = BytesMut::new();
        encode_response(Version::Http10, true, &resp, &trace, &mut out);
        assert!(String::from_utf8(out.to_vec())
            .unwrap()
            .contains("Connection: keep-alive\r\n"));
    }

    #[test]
    fn parses_response_head() {
        let raw = b"HTTP/1.1 404 Not Found\r\nContent-Type: application/json\r\nContent-Length: 21\r\n\r\n{\"error\":\"not_found\"}";
        let head = parse_response_head(raw).unwrap();
        assert_eq!(head.status, 404);
        assert_eq!(head.content_type, "application/json");
        assert_eq!(head.content_length, Some(21));
        assert_eq!(&raw[head.body_start..], b"{\"error\":\"not_found\"}");
    }
}
