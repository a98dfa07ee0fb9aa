//! Transport errors and their classification into the recorded taxonomy.

use serde_json::Value;

use stress_domain::ErrorCategory;

/// Errors that can occur while carrying a request over a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("timeout waiting for response")]
    Timeout,

    #[error("malformed JSON from server: {0}")]
    Parse(String),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("server error {code}: {message}")]
    Server {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("network: {0}")]
    Network(String),

    #[error("transport is closing")]
    Closing,

    #[error("transport is closed")]
    Closed,

    #[error("{0}")]
    Client(String),
}

impl TransportError {
    /// Recorded category per the classification rules: no matching
    /// response in time is a timeout, bad JSON is protocol, a JSON-RPC
    /// error reply is server, connect-level failures are network, and
    /// everything else is client.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout => ErrorCategory::Timeout,
            Self::Parse(_) | Self::Protocol(_) => ErrorCategory::Protocol,
            Self::Server { .. } => ErrorCategory::Server,
            Self::Network(_) => ErrorCategory::Network,
            Self::Closing | Self::Closed | Self::Client(_) => ErrorCategory::Client,
        }
    }

    /// Recorded machine code: -32700 for parse failures, the server's
    /// own code for error replies, -1 otherwise.
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse(_) => -32700,
            Self::Server { code, .. } => *code,
            _ => -1,
        }
    }

    /// Local serialization problems are client errors.
    pub fn from_json(err: serde_json::Error) -> Self {
        Self::Client(format!("JSON serialization: {err}"))
    }

    /// Map a reqwest failure onto the taxonomy.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Network(err.to_string())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else if err.is_request() || err.is_body() {
            Self::Network(err.to_string())
        } else {
            Self::Client(err.to_string())
        }
    }
}

/// A failed request together with the latency the transport observed
/// before giving up (0 when nothing was observed).
#[derive(Debug)]
pub struct RequestFailure {
    pub error: TransportError,
    pub latency_ms: f64,
}

impl RequestFailure {
    pub fn new(error: TransportError, latency_ms: f64) -> Self {
        Self { error, latency_ms }
    }

    /// Failure with no observed latency.
    pub fn immediate(error: TransportError) -> Self {
        Self {
            error,
            latency_ms: 0.0,
        }
    }
}

impl std::fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classification() {
        let err = TransportError::Timeout;
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert_eq!(err.code(), -1);
    }

    #[test]
    fn parse_error_is_protocol_32700() {
        let err = TransportError::Parse("unexpected token".into());
        assert_eq!(err.category(), ErrorCategory::Protocol);
        assert_eq!(err.code(), -32700);
    }

    #[test]
    fn server_error_carries_its_code() {
        let err = TransportError::Server {
            code: -32603,
            message: "internal".into(),
            data: None,
        };
        assert_eq!(err.category(), ErrorCategory::Server);
        assert_eq!(err.code(), -32603);
    }

    #[test]
    fn network_and_client_codes() {
        assert_eq!(
            TransportError::Network("refused".into()).category(),
            ErrorCategory::Network
        );
        assert_eq!(TransportError::Network("refused".into()).code(), -1);
        assert_eq!(
            TransportError::Closing.category(),
            ErrorCategory::Client
        );
        assert_eq!(
            TransportError::Client("misuse".into()).category(),
            ErrorCategory::Client
        );
    }
}
