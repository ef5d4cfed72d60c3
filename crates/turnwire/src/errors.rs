use crate::frame::Channel;

/// Recoverable failures while reading or writing a single wire frame.
///
/// The driver logs these and moves on to the next line; they never end a
/// turn on their own.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Payload after the channel prefix is not valid JSON for that channel.
    #[error("malformed {channel} payload: {message}")]
    MalformedPayload { channel: Channel, message: String },
    /// Tool-channel object carries a `type` this decoder does not know.
    #[error("unrecognized tool-channel type: {0}")]
    UnrecognizedType(String),
    /// Frame could not be serialized.
    #[error("frame encoding failed: {0}")]
    Encode(String),
}

impl WireError {
    pub(crate) fn malformed(channel: Channel, message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            channel,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for WireError {
    fn from(value: serde_json::Error) -> Self {
        WireError::Encode(value.to_string())
    }
}

/// Failures reported by the upstream provider event source before they are
/// folded into the encoder's error frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Provider returned an application-level failure (HTTP status, auth, etc.).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        status_code: Option<u16>,
    },
    /// Transport or stream I/O failed.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Provider response shape or event sequencing was invalid.
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl UpstreamError {
    /// Creates a provider-level error.
    pub fn provider(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Provider {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Provider { message, .. }
            | Self::Transport { message }
            | Self::Protocol { message } => message,
        }
    }

    /// Structured detail attached to the `e:` frame, if any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Provider {
                status_code: Some(code),
                ..
            } => Some(serde_json::json!({ "kind": "provider", "status_code": code })),
            Self::Provider { .. } => Some(serde_json::json!({ "kind": "provider" })),
            Self::Transport { .. } => Some(serde_json::json!({ "kind": "transport" })),
            Self::Protocol { .. } => Some(serde_json::json!({ "kind": "protocol" })),
        }
    }
}

/// Failure reading the wire body on the client side.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// A chunk read failed mid-stream.
    #[error("{0}")]
    Read(String),
}

impl TransportError {
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read(message.into())
    }
}

/// Invalid configuration supplied through the environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_details_carry_status_code() {
        let err = UpstreamError::provider("quota exceeded", Some(429));
        assert_eq!(err.message(), "quota exceeded");
        assert_eq!(
            err.details(),
            Some(serde_json::json!({"kind": "provider", "status_code": 429}))
        );
    }

    #[test]
    fn malformed_payload_names_the_channel() {
        let err = WireError::malformed(Channel::ToolChannel, "expected value");
        assert_eq!(err.to_string(), "malformed t: payload: expected value");
    }
}
