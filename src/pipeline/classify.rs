//! Fault classification driving retry decisions.

use crate::inference::InferenceError;
use serde::Serialize;
use std::fmt;

/// Retry category assigned to an enrichment fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Network or timeout condition that may clear on its own.
    Transient,
    /// Provider throttling; backs off faster than transient faults.
    RateLimit,
    /// Invalid input or output; never retried.
    Permanent,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transient => "transient",
            Self::RateLimit => "rate_limit",
            Self::Permanent => "permanent",
        };
        f.write_str(label)
    }
}

const THROTTLING_MARKERS: [&str; 3] = ["rate limit", "rate_limit", "too many requests"];

/// Map a fault to exactly one retry category.
///
/// Throttling is checked first so that a 429 or a "rate limit" message is never treated as a
/// plain transient fault, whatever transport error carried it.
pub fn classify(fault: &InferenceError) -> ErrorCategory {
    if is_throttled(fault) {
        return ErrorCategory::RateLimit;
    }
    match fault {
        InferenceError::Timeout(_) | InferenceError::Network(_) => ErrorCategory::Transient,
        InferenceError::Status { .. }
        | InferenceError::InvalidResponse(_)
        | InferenceError::Validation(_)
        | InferenceError::MissingInput { .. } => ErrorCategory::Permanent,
    }
}

fn is_throttled(fault: &InferenceError) -> bool {
    if matches!(fault, InferenceError::MissingInput { .. }) {
        return false;
    }
    if fault.status() == Some(429) {
        return true;
    }
    let message = fault.to_string().to_lowercase();
    THROTTLING_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_timeout_faults_are_transient() {
        assert_eq!(
            classify(&InferenceError::Network("connection reset".into())),
            ErrorCategory::Transient
        );
        assert_eq!(
            classify(&InferenceError::Timeout("deadline elapsed".into())),
            ErrorCategory::Transient
        );
    }

    #[test]
    fn status_429_is_rate_limited() {
        let fault = InferenceError::Status {
            status: 429,
            body: String::new(),
        };
        assert_eq!(classify(&fault), ErrorCategory::RateLimit);
    }

    #[test]
    fn rate_limit_message_wins_over_transient() {
        assert_eq!(
            classify(&InferenceError::Network("Rate Limit reached for gpt-4o".into())),
            ErrorCategory::RateLimit
        );
        let fault = InferenceError::Status {
            status: 400,
            body: "{\"code\":\"rate_limit_exceeded\"}".into(),
        };
        assert_eq!(classify(&fault), ErrorCategory::RateLimit);
    }

    #[test]
    fn everything_else_is_permanent() {
        let faults = [
            InferenceError::Status {
                status: 500,
                body: "internal".into(),
            },
            InferenceError::Status {
                status: 401,
                body: "unauthorized".into(),
            },
            InferenceError::InvalidResponse("not json".into()),
            InferenceError::Validation("unknown category".into()),
            InferenceError::MissingInput {
                field: "rate limit".into(),
            },
        ];
        for fault in &faults {
            assert_eq!(classify(fault), ErrorCategory::Permanent, "{fault}");
        }
    }
}
