//! Uniform error carrier used across the framework.
//!
//! Every fallible operation returns [`Result`], which is a plain
//! `std::result::Result` with [`Status`] on the error side. Status carries a
//! kind from a closed set plus a human-readable message; the kind is what
//! callers branch on, the message is for logs and error bodies.

use thiserror::Error;

/// Closed set of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Ok,
    InvalidArgument,
    NotFound,
    Timeout,
    Unavailable,
    Cancelled,
    InternalError,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Ok => "ok",
            StatusKind::InvalidArgument => "invalid_argument",
            StatusKind::NotFound => "not_found",
            StatusKind::Timeout => "timeout",
            StatusKind::Unavailable => "unavailable",
            StatusKind::Cancelled => "cancelled",
            StatusKind::InternalError => "internal_error",
        }
    }
}

/// A failure kind plus message.
#[derive(Debug, Clone, Error)]
#[error("{}: {}", .kind.as_str(), .message)]
pub struct Status {
    kind: StatusKind,
    message: String,
}

impl Status {
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusKind::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Timeout, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Unavailable, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Cancelled, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusKind::InternalError, message)
    }

    pub fn kind(&self) -> StatusKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Framework-wide result alias.
pub type Result<T> = std::result::Result<T, Status>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_carries_kind_and_message() {
        let st = Status::not_found("service not found");
        assert_eq!(st.kind(), StatusKind::NotFound);
        assert_eq!(st.message(), "service not found");
        assert_eq!(st.to_string(), "not_found: service not found");
    }

    #[test]
    fn result_propagates_with_question_mark() {
        fn inner() -> Result<u32> {
            Err(Status::timeout("deadline exceeded"))
        }
        fn outer() -> Result<u32> {
            let v = inner()?;
            Ok(v)
        }
        assert_eq!(outer().unwrap_err().kind(), StatusKind::Timeout);
    }
}
