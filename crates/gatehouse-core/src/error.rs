//! Error types for Gatehouse.
//!
//! This module provides the classified failures that handlers and interceptors
//! return in place of a normal payload:
//!
//! - [`AppError`] - a single error with an [`ErrorKind`], a message and the
//!   source location that constructed it
//! - [`FieldErrors`] - a list of `(field, reason)` validation failures
//!
//! Both capture their [`Provenance`] through `#[track_caller]`, so the error
//! translation stage can log where a failure originated without a backtrace.
//!
//! # The `None` kind
//!
//! [`ErrorKind::None`] marks a value that has the shape of an error but is not
//! a failure. It flows through the error translation stage untouched and is
//! never logged.
//!
//! # Example
//!
//! ```
//! use gatehouse_core::{AppError, ErrorKind};
//!
//! let err = AppError::newf(ErrorKind::PermissionDenied, "Invalid csrf token");
//! assert_eq!(err.kind(), ErrorKind::PermissionDenied);
//! assert!(err.provenance().line() > 0);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`AppError`].
pub type AppResult<T> = Result<T, AppError>;

/// The closed set of error classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Carries an error shape but is not a failure.
    None,
    /// Missing or rejected credentials.
    Unauthenticated,
    /// The caller may not perform this request.
    PermissionDenied,
    /// A rate limit was exceeded.
    TooManyRequests,
    /// One or more request fields failed validation.
    InvalidArgument,
    /// Internal failure with a client-visible message.
    Internal,
    /// Internal failure whose detail is logged but never shown to the client.
    InternalOnlyLog,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::None,
        Self::Unauthenticated,
        Self::PermissionDenied,
        Self::TooManyRequests,
        Self::InvalidArgument,
        Self::Internal,
        Self::InternalOnlyLog,
    ];

    /// Returns the stable machine-readable code for this kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::TooManyRequests => "too_many_requests",
            Self::InvalidArgument => "invalid_argument",
            Self::Internal => "internal",
            Self::InternalOnlyLog => "internal_only_log",
        }
    }

    /// Returns the HTTP status this kind declares, if any.
    ///
    /// Internal kinds declare none; transmission falls back to
    /// `500 Internal Server Error` for any error-shaped reply without a status.
    #[must_use]
    pub const fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::None => Some(StatusCode::OK),
            Self::Unauthenticated => Some(StatusCode::UNAUTHORIZED),
            Self::PermissionDenied => Some(StatusCode::FORBIDDEN),
            Self::TooManyRequests => Some(StatusCode::TOO_MANY_REQUESTS),
            Self::InvalidArgument => Some(StatusCode::BAD_REQUEST),
            Self::Internal | Self::InternalOnlyLog => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The source location that constructed an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provenance {
    file: &'static str,
    line: u32,
}

impl Provenance {
    /// Captures the location of the caller.
    #[track_caller]
    #[must_use]
    pub fn caller() -> Self {
        Location::caller().into()
    }

    /// Returns the full source file path.
    #[must_use]
    pub const fn file(&self) -> &'static str {
        self.file
    }

    /// Returns the final path component of the source file.
    #[must_use]
    pub fn file_name(&self) -> &'static str {
        self.file
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.file)
    }

    /// Returns the source line.
    #[must_use]
    pub const fn line(&self) -> u32 {
        self.line
    }
}

impl From<&'static Location<'static>> for Provenance {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_name(), self.line)
    }
}

/// A single classified failure.
///
/// # Example
///
/// ```
/// use gatehouse_core::{AppError, ErrorKind};
///
/// fn check(token: &str) -> Result<(), AppError> {
///     if token.is_empty() {
///         return Err(AppError::permission_denied("The csrf token is required"));
///     }
///     Ok(())
/// }
///
/// let err = check("").unwrap_err();
/// assert_eq!(err.to_string(), "The csrf token is required");
/// ```
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
    provenance: Provenance,
}

impl AppError {
    /// Creates an error of the given kind from another error.
    #[track_caller]
    pub fn new(kind: ErrorKind, err: impl fmt::Display) -> Self {
        Self {
            kind,
            message: err.to_string(),
            provenance: Provenance::caller(),
        }
    }

    /// Creates an error of the given kind from a message.
    #[track_caller]
    pub fn newf(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provenance: Provenance::caller(),
        }
    }

    /// Creates an `Unauthenticated` error.
    #[track_caller]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::newf(ErrorKind::Unauthenticated, message)
    }

    /// Creates a `PermissionDenied` error.
    #[track_caller]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::newf(ErrorKind::PermissionDenied, message)
    }

    /// Creates a `TooManyRequests` error.
    #[track_caller]
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::newf(ErrorKind::TooManyRequests, message)
    }

    /// Creates an `Internal` error.
    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::newf(ErrorKind::Internal, message)
    }

    /// Creates an `InternalOnlyLog` error.
    #[track_caller]
    pub fn internal_only_log(message: impl Into<String>) -> Self {
        Self::newf(ErrorKind::InternalOnlyLog, message)
    }

    /// Creates a value with the error shape that is not a failure.
    #[track_caller]
    pub fn none(message: impl Into<String>) -> Self {
        Self::newf(ErrorKind::None, message)
    }

    /// Returns the classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns where the error was constructed.
    #[must_use]
    pub const fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Returns `true` unless the kind is [`ErrorKind::None`].
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.kind != ErrorKind::None
    }

    /// Returns the wire body for this error.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody<'_> {
        ErrorBody {
            code: self.kind.code(),
            message: &self.message,
        }
    }
}

/// Serialized form of an [`AppError`].
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    /// Machine-readable error code.
    pub code: &'static str,
    /// Human-readable error message.
    pub message: &'a str,
}

/// One invalid field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name.
    pub field: String,
    /// Why the field is invalid.
    #[serde(rename = "error")]
    pub error: String,
}

/// Field-level validation failures.
///
/// Entries keep insertion order so several independent problems can be
/// reported in a single response.
#[derive(Debug, Clone)]
pub struct FieldErrors {
    errors: Vec<FieldError>,
    provenance: Provenance,
}

impl FieldErrors {
    /// Creates a list holding one field error.
    #[track_caller]
    pub fn new(field: impl Into<String>, err: impl fmt::Display) -> Self {
        Self {
            errors: vec![FieldError {
                field: field.into(),
                error: err.to_string(),
            }],
            provenance: Provenance::caller(),
        }
    }

    /// Creates an empty list.
    #[track_caller]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            errors: Vec::new(),
            provenance: Provenance::caller(),
        }
    }

    /// Appends a field error.
    pub fn push(&mut self, field: impl Into<String>, err: impl fmt::Display) {
        self.errors.push(FieldError {
            field: field.into(),
            error: err.to_string(),
        });
    }

    /// Appends a field error, builder style.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, err: impl fmt::Display) -> Self {
        self.push(field, err);
        self
    }

    /// Returns the entries.
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Returns a `field -> reason` map. Later entries for the same field win.
    #[must_use]
    pub fn fields(&self) -> BTreeMap<&str, &str> {
        self.errors
            .iter()
            .map(|e| (e.field.as_str(), e.error.as_str()))
            .collect()
    }

    /// Returns `true` if no field errors were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Field errors are always [`ErrorKind::InvalidArgument`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }

    /// Returns where the list was constructed.
    #[must_use]
    pub const fn provenance(&self) -> Provenance {
        self.provenance
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", e.field, e.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}
