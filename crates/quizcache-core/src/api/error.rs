use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use crate::decode::DecodeError;

/// Classified refresh failure.
///
/// `Clone` so it can be carried on the repository's broadcast channel;
/// transport errors are flattened to their message for that reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Invalid URL. Please check the URL in settings.")]
    InvalidUrl(String),

    #[error("No internet connection available. Please check your network settings.")]
    NoInternetConnection,

    #[error("Network error: request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP error: {0}")]
    HttpError(u16),

    #[error("No data received from server.")]
    NoData,

    #[error("Failed to parse data: {0}")]
    DecodingError(String),
}

/// Maximum length for transport error details in messages
const MAX_DETAIL_LENGTH: usize = 300;

impl ApiError {
    /// Truncate a detail string to avoid logging excessive data
    fn truncate_detail(detail: &str) -> String {
        if detail.len() <= MAX_DETAIL_LENGTH {
            detail.to_string()
        } else {
            let mut end = MAX_DETAIL_LENGTH;
            while !detail.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &detail[..end], detail.len())
        }
    }

    /// Classify a reqwest transport error.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_connect() && is_offline(err) {
            ApiError::NoInternetConnection
        } else {
            ApiError::NetworkError(Self::truncate_detail(&error_chain(err)))
        }
    }

    /// Short machine-friendly label, used as a tracing field.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidUrl(_) => "invalid_url",
            ApiError::NoInternetConnection => "no_internet_connection",
            ApiError::Timeout => "timeout",
            ApiError::NetworkError(_) => "network_error",
            ApiError::HttpError(_) => "http_error",
            ApiError::NoData => "no_data",
            ApiError::DecodingError(_) => "decoding_error",
        }
    }
}

impl From<DecodeError> for ApiError {
    fn from(err: DecodeError) -> Self {
        ApiError::DecodingError(err.to_string())
    }
}

/// Whether a connect failure means the machine has no usable network,
/// as opposed to the server refusing or resetting the connection.
fn is_offline(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::NetworkUnreachable
                    | io::ErrorKind::HostUnreachable
                    | io::ErrorKind::NetworkDown
            ) {
                return true;
            }
        }
        let message = cause.to_string().to_lowercase();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Flatten an error and its causes into one line.
fn error_chain(err: &reqwest::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !parts.iter().any(|p| p.contains(&text)) {
            parts.push(text);
        }
        source = cause.source();
    }
    parts.join(": ")
}
