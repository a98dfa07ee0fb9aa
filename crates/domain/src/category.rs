//! Error taxonomy for recorded request outcomes.
//!
//! Every failed request is classified into exactly one category. Raw
//! records carry the integer form; NDJSON events carry the string form.

use serde::{Deserialize, Serialize};

/// Category of a failed request.
///
/// The integer mapping (1..5) is part of the on-disk format and must not
/// change. 0 is reserved for success and is never a member of this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Per-request deadline exceeded; the request was abandoned.
    Timeout,
    /// Malformed JSON, unexpected content type, stream ended early.
    Protocol,
    /// JSON-RPC reply carrying an `error` member.
    Server,
    /// TCP / DNS / TLS failure.
    Network,
    /// Everything else, including local misuse.
    Client,
}

impl ErrorCategory {
    /// Stable integer form used in raw records (success is 0).
    pub fn as_int(self) -> u8 {
        match self {
            Self::Timeout => 1,
            Self::Protocol => 2,
            Self::Server => 3,
            Self::Network => 4,
            Self::Client => 5,
        }
    }

    /// Inverse of [`as_int`](Self::as_int). Returns `None` for 0 (success)
    /// and out-of-range values.
    pub fn from_int(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Timeout),
            2 => Some(Self::Protocol),
            3 => Some(Self::Server),
            4 => Some(Self::Network),
            5 => Some(Self::Client),
            _ => None,
        }
    }

    /// Wire string used in NDJSON events and console reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Protocol => "protocol",
            Self::Server => "server",
            Self::Network => "network",
            Self::Client => "client",
        }
    }

    /// All categories, in integer order.
    pub fn all() -> [Self; 5] {
        [
            Self::Timeout,
            Self::Protocol,
            Self::Server,
            Self::Network,
            Self::Client,
        ]
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_mapping_is_stable() {
        assert_eq!(ErrorCategory::Timeout.as_int(), 1);
        assert_eq!(ErrorCategory::Protocol.as_int(), 2);
        assert_eq!(ErrorCategory::Server.as_int(), 3);
        assert_eq!(ErrorCategory::Network.as_int(), 4);
        assert_eq!(ErrorCategory::Client.as_int(), 5);
    }

    #[test]
    fn int_roundtrip() {
        for cat in ErrorCategory::all() {
            assert_eq!(ErrorCategory::from_int(cat.as_int()), Some(cat));
        }
        assert_eq!(ErrorCategory::from_int(0), None);
        assert_eq!(ErrorCategory::from_int(6), None);
    }

    #[test]
    fn serializes_as_lowercase_string() {
        let json = serde_json::to_string(&ErrorCategory::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
        let back: ErrorCategory = serde_json::from_str("\"network\"").unwrap();
        assert_eq!(back, ErrorCategory::Network);
    }
}
