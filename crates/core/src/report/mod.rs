//! Sanitized error reporting.
//!
//! Internal errors are logged with full (redacted) context for operator
//! diagnosis; only a correlation id and a generic message ever cross the
//! service boundary.

mod sanitize;

pub use sanitize::{sanitize_value, ValueSanitizer};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

/// How bad it is. Only `Critical` retains the error's debug
/// representation in internal logs; everything else logs the display
/// chain only, limiting what an internal-log leak can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// The only error shape exposed outside the service.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedResponse {
    pub error_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
}

/// Converts internal errors into correlation-tagged sanitized responses.
pub struct SecureErrorReporter {
    service: String,
    sanitizer: ValueSanitizer,
}

impl SecureErrorReporter {
    pub fn new(service: impl Into<String>, max_value_len: usize) -> Self {
        Self {
            service: service.into(),
            sanitizer: ValueSanitizer::new(max_value_len),
        }
    }

    /// Log the error internally with redacted context and return the
    /// external-safe response.
    pub fn report(
        &self,
        err: &(dyn std::error::Error + 'static),
        context: &serde_json::Value,
        severity: Severity,
    ) -> SanitizedResponse {
        let error_id = Uuid::new_v4().to_string();
        let sanitized_context = self.sanitizer.sanitize(context);

        match severity {
            Severity::Critical => {
                error!(
                    error_id = %error_id,
                    severity = severity.as_str(),
                    context = %sanitized_context,
                    error = ?err,
                    "internal error"
                );
            }
            Severity::High => {
                error!(
                    error_id = %error_id,
                    severity = severity.as_str(),
                    context = %sanitized_context,
                    error = %err,
                    "internal error"
                );
            }
            Severity::Low | Severity::Medium => {
                warn!(
                    error_id = %error_id,
                    severity = severity.as_str(),
                    context = %sanitized_context,
                    error = %err,
                    "internal error"
                );
            }
        }

        SanitizedResponse {
            error_id,
            message: "An internal error occurred. Reference the error_id when reporting."
                .to_string(),
            timestamp: Utc::now(),
            service: self.service.clone(),
        }
    }
}
