use thiserror::Error;

/// Failures raised while selecting and constructing a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("URL must be provided for SSE or HTTP transport types.")]
    MissingUrl,

    #[error("Command must be provided for stdio transport type.")]
    MissingCommand,

    #[error("Unsupported transport type: {0}")]
    UnsupportedTransport(String),

    #[error("{0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{0}")]
    Construction(String),
}

/// Coarse classification of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Detected before any downstream constructor ran.
    Configuration,
    /// The URL string did not parse.
    UrlParse,
    /// Executable resolution or a transport constructor failed.
    DownstreamConstruction,
}

impl TransportError {
    pub fn construction(message: impl std::fmt::Display) -> Self {
        Self::Construction(message.to_string())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            TransportError::MissingUrl
            | TransportError::MissingCommand
            | TransportError::UnsupportedTransport(_) => ErrorCategory::Configuration,
            TransportError::InvalidUrl(_) => ErrorCategory::UrlParse,
            TransportError::Construction(_) => ErrorCategory::DownstreamConstruction,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::construction(err)
    }
}

impl From<reqwest::header::InvalidHeaderName> for TransportError {
    fn from(err: reqwest::header::InvalidHeaderName) -> Self {
        Self::construction(err)
    }
}

impl From<reqwest::header::InvalidHeaderValue> for TransportError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::construction(err)
    }
}

/// The single error surfaced by
/// [`TransportFactory::create_transport`](crate::TransportFactory::create_transport).
///
/// Callers that only report the failure can rely on the rendered message
/// (`Failed to create transport: ...`); callers that want to branch can
/// inspect [`TransportCreationError::kind`].
#[derive(Debug, Error)]
#[error("Failed to create transport: {source}")]
pub struct TransportCreationError {
    #[source]
    source: TransportError,
}

impl TransportCreationError {
    pub fn kind(&self) -> &TransportError {
        &self.source
    }

    pub fn category(&self) -> ErrorCategory {
        self.source.category()
    }

    pub fn into_inner(self) -> TransportError {
        self.source
    }
}

impl From<TransportError> for TransportCreationError {
    fn from(source: TransportError) -> Self {
        Self { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_message_format() {
        let err = TransportCreationError::from(TransportError::MissingUrl);
        assert_eq!(
            err.to_string(),
            "Failed to create transport: URL must be provided for SSE or HTTP transport types."
        );
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_parse_error_keeps_original_message() {
        let parse_err = url::Url::parse("not a url").unwrap_err();
        let expected = parse_err.to_string();
        let err = TransportCreationError::from(TransportError::from(parse_err));
        assert_eq!(err.to_string(), format!("Failed to create transport: {}", expected));
        assert_eq!(err.category(), ErrorCategory::UrlParse);
    }

    #[test]
    fn test_construction_category() {
        let err = TransportError::construction("spawn refused");
        assert_eq!(err.to_string(), "spawn refused");
        assert_eq!(err.category(), ErrorCategory::DownstreamConstruction);
    }
}
