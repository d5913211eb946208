//! Unified error type for the conversion service.
//!
//! Every crate in the workspace funnels its failures into [`Error`]. The HTTP
//! layer derives a status code from [`Error::http_status`]; the job engine
//! uses the encode-path variants to decide whether a fallback is allowed.

use std::fmt;

/// Unified error type covering all failure modes of the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "conversion").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Caller input failed validation. The message already names the field.
    #[error("{message}")]
    Validation {
        /// The offending field (e.g. "quality", "file").
        field: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// The request conflicts with the current state of a resource.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An auxiliary external tool (ffprobe, version checks) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An encoder process could not be started.
    #[error("Failed to start {tool}: {message}")]
    Spawn {
        /// Name of the program that could not be started.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An encoder ran but exited non-zero or produced no usable output.
    #[error("Encoding failed [{backend}]: {message}")]
    Encode {
        /// Name of the encoder backend.
        backend: String,
        /// Diagnostic tail or verification failure.
        message: String,
    },

    /// Work was abandoned because the service is shutting down.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation { .. } => 400,
            Error::Conflict(_) => 409,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Spawn { .. } => 502,
            Error::Encode { .. } => 500,
            Error::Cancelled(_) => 503,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Validation { .. } => "validation_error",
            Error::Conflict(_) => "conflict",
            Error::Io { .. } => "io_error",
            Error::Tool { .. } => "tool_error",
            Error::Spawn { .. } => "spawn_error",
            Error::Encode { .. } => "encode_failure",
            Error::Cancelled(_) => "cancelled",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Whether a failed encode attempt may be retried with the next backend.
    ///
    /// Cancellation is final; every other encode-path failure is retryable.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, Error::Cancelled(_))
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Spawn`].
    pub fn spawn(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Spawn {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Encode`].
    pub fn encode(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Encode {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// The offending field if this is a validation error.
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("conversion", "abc-123");
        assert_eq!(err.to_string(), "conversion not found: abc-123");
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn validation_carries_field() {
        let err = Error::validation("quality", "quality must be between 0 and 63 (got 999)");
        assert_eq!(err.to_string(), "quality must be between 0 and 63 (got 999)");
        assert_eq!(err.field(), Some("quality"));
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn conflict_display() {
        let err = Error::Conflict("conversion is still processing".into());
        assert_eq!(err.to_string(), "Conflict: conversion is still processing");
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
        assert_eq!(err.field(), None);
    }

    #[test]
    fn spawn_display() {
        let err = Error::spawn("ffmpeg", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "Failed to start ffmpeg: No such file or directory"
        );
        assert_eq!(err.code(), "spawn_error");
    }

    #[test]
    fn encode_display() {
        let err = Error::encode("ffmpeg-vp9", "exit status 1: Invalid argument");
        assert_eq!(
            err.to_string(),
            "Encoding failed [ffmpeg-vp9]: exit status 1: Invalid argument"
        );
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn cancellation_blocks_fallback() {
        assert!(!Error::Cancelled("shutdown".into()).allows_fallback());
        assert!(Error::spawn("ffmpeg", "missing").allows_fallback());
        assert!(Error::encode("ffmpeg-vp9", "exit 1").allows_fallback());
    }

    #[test]
    fn result_alias() {
        fn ok_fn() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(ok_fn().unwrap(), 42);

        fn err_fn() -> Result<i32> {
            Err(Error::Internal("boom".into()))
        }
        assert!(err_fn().is_err());
    }
}
