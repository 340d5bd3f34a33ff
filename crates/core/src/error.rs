// Error handling for the narration client

use std::fmt;

/// Narration client error types
#[derive(Debug, Clone, PartialEq)]
pub enum NarrationError {
    /// The remote service could not be reached (DNS, connect, read, TLS)
    NetworkUnavailable(String),

    /// The remote service answered with a non-2xx status
    NonSuccessStatus { status: u16, detail: String },

    /// The service sent more audio than the client accepts
    PayloadTooLarge { limit: u64 },

    /// The media element reported a decode or playback fault
    MediaPlaybackError(String),

    /// Operation issued in a state that cannot honour it
    InvalidState(String),

    /// Caller supplied an argument outside the accepted domain
    InvalidArgument(String),

    /// Audio payload could not be decoded
    DecodingError(String),

    /// Output device error
    DeviceError(String),

    /// IO error
    IoError(String),

    /// JSON / TOML (de)serialization error
    Serialization(String),

    /// Configuration could not be loaded
    Config(String),
}

impl NarrationError {
    /// True for failures that come from talking to the remote service.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            NarrationError::NetworkUnavailable(_)
                | NarrationError::NonSuccessStatus { .. }
                | NarrationError::PayloadTooLarge { .. }
        )
    }

    /// HTTP status of a rejected request, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            NarrationError::NonSuccessStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for NarrationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NarrationError::NetworkUnavailable(msg) => write!(f, "Network unavailable: {}", msg),
            NarrationError::NonSuccessStatus { status, detail } => {
                write!(f, "Request rejected with status {}: {}", status, detail)
            }
            NarrationError::PayloadTooLarge { limit } => {
                write!(f, "Audio payload exceeds the {} byte limit", limit)
            }
            NarrationError::MediaPlaybackError(msg) => write!(f, "Playback error: {}", msg),
            NarrationError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            NarrationError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            NarrationError::DecodingError(msg) => write!(f, "Decoding error: {}", msg),
            NarrationError::DeviceError(msg) => write!(f, "Device error: {}", msg),
            NarrationError::IoError(msg) => write!(f, "IO error: {}", msg),
            NarrationError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            NarrationError::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for NarrationError {}

/// Result type alias for narration operations
pub type Result<T> = std::result::Result<T, NarrationError>;

impl From<std::io::Error> for NarrationError {
    fn from(err: std::io::Error) -> Self {
        NarrationError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for NarrationError {
    fn from(err: serde_json::Error) -> Self {
        NarrationError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for NarrationError {
    fn from(err: toml::de::Error) -> Self {
        NarrationError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_failure_classification() {
        assert!(NarrationError::NetworkUnavailable("refused".into()).is_fetch_failure());
        assert!(NarrationError::NonSuccessStatus {
            status: 404,
            detail: "No audio data found for this timestamp".into()
        }
        .is_fetch_failure());
        assert!(NarrationError::PayloadTooLarge { limit: 1024 }.is_fetch_failure());
        assert!(!NarrationError::MediaPlaybackError("bad frame".into()).is_fetch_failure());
        assert!(!NarrationError::DecodingError("not audio".into()).is_fetch_failure());
    }

    #[test]
    fn test_status_display() {
        let err = NarrationError::NonSuccessStatus {
            status: 401,
            detail: "Not authenticated".into(),
        };
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "Request rejected with status 401: Not authenticated");
    }
}
