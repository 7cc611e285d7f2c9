use thiserror::Error;

/// the only failure text ever rendered to the user.
pub const GENERIC_FAILURE_MESSAGE: &str = "Error fetching response. Please try again.";

/// closed set of failure categories for one completion request.
///
/// none of these are fatal to a session; they all land in a displayable
/// `Failed` state and the next submission starts fresh.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// no credential configured; nothing was sent.
    #[error("missing credential")]
    MissingCredential,
    /// the request never got a response (dns, connect, tls, reset...).
    #[error("network unavailable")]
    NetworkUnavailable,
    /// the service answered with a non-success status.
    #[error("transport error (http {0})")]
    TransportError(u16),
    /// success status, but the body is not the expected completion shape.
    #[error("malformed response")]
    MalformedResponse,
}

impl ErrorKind {
    /// user-facing text; intentionally the same for every kind.
    pub fn user_message(&self) -> &'static str {
        GENERIC_FAILURE_MESSAGE
    }
}

/// a classified failure plus the diagnostics behind it.
///
/// `detail` is for logs only (status line, raw error body, transport error).
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct CompletionError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl CompletionError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    pub fn missing_credential() -> Self {
        Self::new(ErrorKind::MissingCredential, "no credential configured")
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkUnavailable, detail)
    }

    pub fn status(status: u16, body: &str) -> Self {
        let detail = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        };
        Self::new(ErrorKind::TransportError(status), detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_hides_kind_and_detail() {
        let err = CompletionError::status(500, "{\"error\":\"boom\"}");
        assert_eq!(err.kind, ErrorKind::TransportError(500));
        assert_eq!(err.kind.user_message(), GENERIC_FAILURE_MESSAGE);
        assert!(!err.kind.user_message().contains("500"));
        // diagnostics stay available for logging
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn status_detail_without_body() {
        let err = CompletionError::status(404, "");
        assert_eq!(err.detail, "HTTP 404");
        assert_eq!(err.to_string(), "transport error (http 404): HTTP 404");
    }
}
