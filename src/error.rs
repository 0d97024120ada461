//! Error types for tripreel

use thiserror::Error;

/// Result type alias for tripreel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tripreel operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Render configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No codec in the preference list is available on this system
    #[error("Codec unavailable: {0}")]
    CodecUnavailable(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image processing error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Media fetch error
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Encoding error
    #[error("Encoding error: {0}")]
    Encode(String),

    /// Decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Muxing error
    #[error("Muxing error: {0}")]
    Mux(String),

    /// FFmpeg process error
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// Generation was cancelled by the caller
    #[error("Generation cancelled")]
    Cancelled,
}

/// Coarse error classification, carried as a number on error progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid input parameter or configuration
    InvalidInput = 1,
    /// Codec not available
    CodecUnavailable = 2,
    /// I/O or fetch error
    IoError = 3,
    /// Encoding error
    EncodeError = 4,
    /// Decoding error
    DecodeError = 5,
    /// Cancelled by the caller
    Cancelled = 6,
}

impl From<&Error> for ErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::InvalidInput(_) => ErrorCode::InvalidInput,
            Error::InvalidConfig(_) => ErrorCode::InvalidInput,
            Error::Json(_) => ErrorCode::InvalidInput,
            Error::CodecUnavailable(_) => ErrorCode::CodecUnavailable,
            Error::Io(_) => ErrorCode::IoError,
            Error::Fetch(_) => ErrorCode::IoError,
            Error::Image(_) => ErrorCode::DecodeError,
            Error::Decode(_) => ErrorCode::DecodeError,
            Error::Encode(_) => ErrorCode::EncodeError,
            Error::Mux(_) => ErrorCode::EncodeError,
            Error::Ffmpeg(_) => ErrorCode::EncodeError,
            Error::Cancelled => ErrorCode::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_classification() {
        assert_eq!(
            ErrorCode::from(&Error::InvalidConfig("x".into())),
            ErrorCode::InvalidInput
        );
        assert_eq!(ErrorCode::from(&Error::Cancelled), ErrorCode::Cancelled);
        assert_eq!(
            ErrorCode::from(&Error::Ffmpeg("boom".into())),
            ErrorCode::EncodeError
        );
        assert_eq!(ErrorCode::from(&Error::Fetch("404".into())) as u8, 3);
    }
}
