//! Shared error type across meterhub crates.

use thiserror::Error;

use crate::id::MeterKind;

/// Stable error codes (used by tests, logs and the HTTP layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Same name registered with a different instrument kind.
    KindConflict,
    /// Negative counter increment.
    InvalidDelta,
    /// Configuration rejected at load/validate time.
    InvalidConfig,
    /// One instrument could not be rendered.
    RenderFailure,
    /// Push exporter could not deliver a snapshot.
    ExportDelivery,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::KindConflict => "KIND_CONFLICT",
            ErrorCode::InvalidDelta => "INVALID_DELTA",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::RenderFailure => "RENDER_FAILURE",
            ErrorCode::ExportDelivery => "EXPORT_DELIVERY",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MeterError>;

/// Unified error type used by core and export.
#[derive(Debug, Error)]
pub enum MeterError {
    #[error("kind conflict: {name} is registered as {existing}, requested {requested}")]
    KindConflict {
        name: String,
        existing: MeterKind,
        requested: MeterKind,
    },
    #[error("invalid delta: {0} (counters only move forward)")]
    InvalidDelta(i64),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("render failure ({meter}): {reason}")]
    RenderFailure { meter: String, reason: String },
    #[error("export delivery failed ({exporter}): {reason}")]
    ExportDelivery { exporter: String, reason: String },
    #[error("internal: {0}")]
    Internal(String),
}

impl MeterError {
    /// Map an error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeterError::KindConflict { .. } => ErrorCode::KindConflict,
            MeterError::InvalidDelta(_) => ErrorCode::InvalidDelta,
            MeterError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            MeterError::RenderFailure { .. } => ErrorCode::RenderFailure,
            MeterError::ExportDelivery { .. } => ErrorCode::ExportDelivery,
            MeterError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub(crate) fn render(meter: impl ToString, reason: impl Into<String>) -> Self {
        MeterError::RenderFailure {
            meter: meter.to_string(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for push exporters.
    pub fn delivery(exporter: impl Into<String>, reason: impl Into<String>) -> Self {
        MeterError::ExportDelivery {
            exporter: exporter.into(),
            reason: reason.into(),
        }
    }
}
