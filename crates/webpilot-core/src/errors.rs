/// Typed error hierarchy for plan-generation calls.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("missing model credential")]
    MissingCredential,
    #[error("provider returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid plan response: {0}")]
    InvalidResponse(String),
    #[error("request timed out")]
    Timeout,
}

impl GeneratorError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Http { status, .. } => matches!(status, 429 | 500..=599),
            Self::MissingCredential | Self::InvalidResponse(_) => false,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::Http { .. } => "http",
            Self::Network(_) => "network",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Timeout => "timeout",
        }
    }

    pub fn from_status(status: u16, body: String) -> Self {
        Self::Http { status, body }
    }
}

/// Per-message failures at the connection boundary. Every variant is
/// converted into an outbound ERROR frame; none closes the connection.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to process message")]
    Decode(String),
    #[error("{0}")]
    Validation(String),
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("{0}")]
    Generation(#[from] GeneratorError),
}

impl ProtocolError {
    /// Human-readable string carried by the outbound ERROR frame.
    pub fn client_message(&self) -> String {
        match self {
            // Parse details stay in the logs; clients get the stable string.
            Self::Decode(_) => "failed to process message".to_string(),
            Self::Validation(msg) => msg.clone(),
            Self::ServiceUnavailable => "service unavailable".to_string(),
            Self::Generation(e) => format!("failed to create task plan: {e}"),
        }
    }

    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Validation(_) => "validation",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Generation(_) => "generation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(GeneratorError::Network("tcp reset".into()).is_retryable());
        assert!(GeneratorError::Timeout.is_retryable());
        assert!(GeneratorError::from_status(429, "rate limited".into()).is_retryable());
        assert!(GeneratorError::from_status(503, "unavailable".into()).is_retryable());
        assert!(!GeneratorError::from_status(400, "bad request".into()).is_retryable());
        assert!(!GeneratorError::MissingCredential.is_retryable());
        assert!(!GeneratorError::InvalidResponse("not json".into()).is_retryable());
    }

    #[test]
    fn decode_error_hides_parse_details() {
        let err = ProtocolError::Decode("expected value at line 1".into());
        assert_eq!(err.client_message(), "failed to process message");
    }

    #[test]
    fn validation_error_passes_message_through() {
        let err = ProtocolError::Validation("command is required".into());
        assert_eq!(err.client_message(), "command is required");
    }

    #[test]
    fn service_unavailable_message() {
        assert_eq!(
            ProtocolError::ServiceUnavailable.client_message(),
            "service unavailable"
        );
    }

    #[test]
    fn generation_error_converts() {
        let err: ProtocolError = GeneratorError::InvalidResponse("truncated".into()).into();
        assert_eq!(err.error_kind(), "generation");
        assert!(err.client_message().contains("failed to create task plan"));
    }
}
