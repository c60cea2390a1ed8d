use thiserror::Error;

/// Sentinel error code the Offline Manager's conflict handling dispatches on.
pub const CONFLICT_CODE: &str = "CONFLICT";

/// A typed transport error: HTTP failures carry the status code and any
/// server-supplied `{code, message, details}` triple; everything else is a
/// network-level failure.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("http {status}: {message}")]
    Http {
        status: u16,
        code: Option<String>,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            TransportError::Http { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            TransportError::Http { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_bad_request(&self) -> bool {
        self.status() == Some(400)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(s) if (500..600).contains(&s))
    }

    /// A conflict is signalled by an error value whose code is the sentinel
    /// `CONFLICT`; it carries the server's current state in `details`.
    pub fn is_conflict(&self) -> bool {
        self.code() == Some(CONFLICT_CODE)
    }

    /// 5xx, timeouts, and connection failures are retried via the Offline
    /// Manager when applicable; 4xx responses are surfaced, not retried.
    pub fn is_recoverable(&self) -> bool {
        self.is_server_error() || matches!(self, TransportError::Timeout | TransportError::Network(_))
    }
}
