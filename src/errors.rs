// src/errors.rs
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fieldless discriminant of [`AnalysisError`], carried by progress events and
/// analytics metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkError,
    Timeout,
    RateLimitExceeded,
    InvalidResponse,
    ServerError,
    Unauthorized,
    NoData,
    ImageTooLarge,
    NotClaimedSubject,
    ParsingError,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NoData => "no_data",
            ErrorKind::ImageTooLarge => "image_too_large",
            ErrorKind::NotClaimedSubject => "not_claimed_subject",
            ErrorKind::ParsingError => "parsing_error",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

/// Every way an analysis can fail. The `Display` text is the message shown to
/// the user; technical detail stays in the variant fields for logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Unable to connect to the internet. Please check your connection and try again.")]
    Network(String),

    #[error("The request timed out. Please try again when you have a stronger connection.")]
    Timeout,

    #[error("We've reached our limit for AI analysis. Please try again in a few minutes.")]
    RateLimitExceeded,

    #[error(
        "We received an invalid response from our AI service (Code: {0}). Please try again."
    )]
    InvalidResponse(u16),

    #[error("The AI service is experiencing issues (Error {0}). Please try again later.")]
    ServerError(u16),

    #[error("Authentication error. Please restart the app or contact support.")]
    Unauthorized,

    #[error("No data was received from the analysis service. Please try again.")]
    NoData,

    #[error("Your image is too large. Please try a smaller image or reduce the quality.")]
    ImageTooLarge,

    #[error("{}", not_claimed_message(.subject, .explanation))]
    NotClaimedSubject {
        subject: String,
        explanation: String,
    },

    #[error("There was an error processing the response. Please try again.")]
    Parsing(String),

    #[error("The analysis was cancelled.")]
    Cancelled,
}

fn not_claimed_message(subject: &str, explanation: &str) -> String {
    if explanation.is_empty() {
        format!("Our AI couldn't detect a {subject} in this image. Please try another photo.")
    } else {
        format!("This doesn't appear to be a {subject}: {explanation}")
    }
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Network(_) => ErrorKind::NetworkError,
            AnalysisError::Timeout => ErrorKind::Timeout,
            AnalysisError::RateLimitExceeded => ErrorKind::RateLimitExceeded,
            AnalysisError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            AnalysisError::ServerError(_) => ErrorKind::ServerError,
            AnalysisError::Unauthorized => ErrorKind::Unauthorized,
            AnalysisError::NoData => ErrorKind::NoData,
            AnalysisError::ImageTooLarge => ErrorKind::ImageTooLarge,
            AnalysisError::NotClaimedSubject { .. } => ErrorKind::NotClaimedSubject,
            AnalysisError::Parsing(_) => ErrorKind::ParsingError,
            AnalysisError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl ResponseError for AnalysisError {
    fn status_code(&self) -> StatusCode {
        match self {
            AnalysisError::Network(_) | AnalysisError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            AnalysisError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AnalysisError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AnalysisError::InvalidResponse(_)
            | AnalysisError::ServerError(_)
            | AnalysisError::Unauthorized
            | AnalysisError::NoData
            | AnalysisError::Parsing(_) => StatusCode::BAD_GATEWAY,
            AnalysisError::ImageTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AnalysisError::NotClaimedSubject { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.kind(),
            "message": self.to_string()
        }))
    }
}
