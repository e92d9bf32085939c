use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};
use std::fmt;

/// Failure classes surfaced by the HTTP handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Required input is missing or malformed.
    BadRequest,
    /// The chunk store has not finished initializing.
    ServiceUnavailable,
    /// No stored file matches the request.
    NotFound,
    /// Store or transport failure.
    Internal,
}

impl ErrorKind {
    /// Existing clients only distinguish 400/404/500, so an uninitialized
    /// store reports 500 like any other server-side failure.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ServiceUnavailable | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// JSON key the message is reported under. The upload route uses `error`,
/// the download route `err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorField {
    Error,
    Err,
}

impl ErrorField {
    fn key(self) -> &'static str {
        match self {
            ErrorField::Error => "error",
            ErrorField::Err => "err",
        }
    }
}

/// A lightweight wrapper for handler errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<String>,
    pub field: ErrorField,
}

impl AppError {
    /// Create a new AppError with a specific kind and message.
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            details: None,
            field: ErrorField::Error,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }

    /// Attach the underlying error text as `details`.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Report the message under `err` instead of `error`.
    pub fn as_err_field(mut self) -> Self {
        self.field = ErrorField::Err;
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {}", self.message, details),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = Map::new();
        body.insert(self.field.key().into(), Value::String(self.message));
        if let Some(details) = self.details {
            body.insert("details".into(), Value::String(details));
        }

        (self.kind.status(), Json(Value::Object(body))).into_response()
    }
}
