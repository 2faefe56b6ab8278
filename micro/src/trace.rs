//! W3C trace-context propagation.
//!
//! The wire form is the `traceparent` header:
//! `"00-" + trace_id(32 hex) + "-" + span_id(16 hex) + "-" + flags(2 hex)`,
//! 55 characters total. Only lowercase hex is accepted, which is also what we
//! generate.

use rand::RngCore;

const HEX: &[u8; 16] = b"0123456789abcdef";

fn is_lower_hex(c: u8) -> bool {
    c.is_ascii_digit() || (b'a'..=b'f').contains(&c)
}

fn all_lower_hex(s: &str) -> bool {
    s.bytes().all(is_lower_hex)
}

fn random_hex(bytes: usize) -> String {
    let mut raw = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut raw);
    let mut out = String::with_capacity(bytes * 2);
    for b in raw {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0xF) as usize] as char);
    }
    out
}

/// A parsed or generated trace context.
///
/// The default value is invalid; use [`TraceContext::new_root`] or
/// [`TraceContext::parse_traceparent`] to obtain a usable one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub flags: String,
}

impl TraceContext {
    /// A context is valid iff all three fields are lowercase hex of the right
    /// width and neither id is all-zero.
    pub fn is_valid(&self) -> bool {
        if self.trace_id.len() != 32 || self.span_id.len() != 16 || self.flags.len() != 2 {
            return false;
        }
        if !all_lower_hex(&self.trace_id)
            || !all_lower_hex(&self.span_id)
            || !all_lower_hex(&self.flags)
        {
            return false;
        }
        if self.trace_id.bytes().all(|c| c == b'0') {
            return false;
        }
        if self.span_id.bytes().all(|c| c == b'0') {
            return false;
        }
        true
    }

    /// Start a fresh trace, sampled by default.
    pub fn new_root() -> Self {
        Self {
            trace_id: random_hex(16),
            span_id: random_hex(8),
            flags: "01".to_string(),
        }
    }

    /// Derive a child span: same trace, new span id, parent's flags.
    pub fn new_child(parent: &TraceContext) -> Self {
        let ctx = Self {
            trace_id: parent.trace_id.clone(),
            span_id: random_hex(8),
            flags: if parent.flags.is_empty() {
                "01".to_string()
            } else {
                parent.flags.clone()
            },
        };
        if !ctx.is_valid() {
            return Self::new_root();
        }
        ctx
    }

    /// Parse a `traceparent` header value. Returns an invalid (default)
    /// context when the input does not conform.
    pub fn parse_traceparent(traceparent: &str) -> Self {
        if traceparent.len() != 55 || !traceparent.is_ascii() {
            return Self::default();
        }
        let b = traceparent.as_bytes();
        if b[2] != b'-' || b[35] != b'-' || b[52] != b'-' {
            return Self::default();
        }
        if !all_lower_hex(&traceparent[0..2]) {
            return Self::default();
        }

        let ctx = Self {
            trace_id: traceparent[3..35].to_string(),
            span_id: traceparent[36..52].to_string(),
            flags: traceparent[53..55].to_string(),
        };
        if !ctx.is_valid() {
            return Self::default();
        }
        ctx
    }

    /// Render the 55-character wire form, or an empty string when invalid.
    pub fn to_traceparent(&self) -> String {
        if !self.is_valid() {
            return String::new();
        }
        format!("00-{}-{}-{}", self.trace_id, self.span_id, self.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_round_trips() {
        for _ in 0..64 {
            let ctx = TraceContext::new_root();
            assert!(ctx.is_valid());

            let tp = ctx.to_traceparent();
            assert_eq!(tp.len(), 55);

            let parsed = TraceContext::parse_traceparent(&tp);
            assert!(parsed.is_valid());
            assert_eq!(parsed, ctx);
        }
    }

    #[test]
    fn child_shares_trace_id() {
        let root = TraceContext::new_root();
        let child = TraceContext::new_child(&root);

        assert!(child.is_valid());
        assert_eq!(child.trace_id, root.trace_id);
        assert_ne!(child.span_id, root.span_id);
        assert_eq!(child.flags, root.flags);
    }

    #[test]
    fn child_of_invalid_parent_becomes_root() {
        let child = TraceContext::new_child(&TraceContext::default());
        assert!(child.is_valid());
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(!TraceContext::parse_traceparent("").is_valid());
        assert!(!TraceContext::parse_traceparent("00-abc").is_valid());

        // correct length, uppercase hex
        let upper = "00-ABCDEF00112233445566778899AABBCC-1122334455667788-01";
        assert_eq!(upper.len(), 55);
        assert!(!TraceContext::parse_traceparent(upper).is_valid());

        // all-zero ids
        let zero_trace = "00-00000000000000000000000000000000-1122334455667788-01";
        assert!(!TraceContext::parse_traceparent(zero_trace).is_valid());
        let zero_span = "00-abcdef00112233445566778899aabbcc-0000000000000000-01";
        assert!(!TraceContext::parse_traceparent(zero_span).is_valid());

        // misplaced separators
        let bad_sep = "00xabcdef00112233445566778899aabbcc-1122334455667788-01";
        assert_eq!(bad_sep.len(), 55);
        assert!(!TraceContext::parse_traceparent(bad_sep).is_valid());
    }

    #[test]
    fn to_traceparent_of_invalid_is_empty() {
        assert_eq!(TraceContext::default().to_traceparent(), "");
    }
}
