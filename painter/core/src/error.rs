//! Error taxonomy
//!
//! Every fault the painter can observe falls into one of five buckets. Only
//! [`PainterError::Format`] at startup is fatal; the rest are absorbed by the
//! reconnect and retry loops and only ever surface as log lines.

use thiserror::Error;

/// Errors produced by the painter core
#[derive(Debug, Error)]
pub enum PainterError {
    /// Malformed snapshot or asset
    #[error("Format error: {0}")]
    Format(String),

    /// Dial, read or write failure on the network
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed realtime frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Remote write rejected because the server-side budget was exhausted
    #[error("Rate limited by remote (status {status})")]
    RateLimited {
        /// HTTP status returned by the remote
        status: u16,
    },

    /// Remote write rejected for any other reason
    #[error("Write rejected (status {status:?}): {reason}")]
    RejectedOther {
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Human readable reason
        reason: String,
    },
}

impl PainterError {
    /// Whether a failed write still consumed real server-side budget
    ///
    /// Rate-limit rejections count against the budget; everything else is
    /// released so the local scheduler does not over-throttle.
    #[must_use]
    pub fn retains_cost(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

impl From<image::ImageError> for PainterError {
    fn from(err: image::ImageError) -> Self {
        Self::Format(format!("Failed to decode image: {err}"))
    }
}

impl From<reqwest::Error> for PainterError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result alias used throughout the core
pub type PainterResult<T> = Result<T, PainterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rate_limit_retains_cost() {
        assert!(PainterError::RateLimited { status: 403 }.retains_cost());
        assert!(!PainterError::RejectedOther {
            status: Some(400),
            reason: "bad color".into()
        }
        .retains_cost());
        assert!(!PainterError::Transport("reset".into()).retains_cost());
        assert!(!PainterError::Format("bounds".into()).retains_cost());
    }

    #[test]
    fn test_error_display() {
        let err = PainterError::RateLimited { status: 403 };
        assert!(err.to_string().contains("403"));

        let err = PainterError::Protocol("short frame".into());
        assert!(err.to_string().contains("short frame"));
    }
}
