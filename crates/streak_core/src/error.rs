use thiserror::Error;

/// Errors raised by the computation core. Empty input is never one of them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalyticsError {
    #[error("invalid window: {0}")]
    InvalidWindow(String),

    #[error("malformed cadence `{value}`: {reason}")]
    MalformedCadence { value: String, reason: String },
}

impl AnalyticsError {
    pub(crate) fn zero_window(name: &str) -> Self {
        Self::InvalidWindow(format!("{name} must cover at least one day"))
    }

    pub(crate) fn window_too_long(name: &str, days: u32) -> Self {
        Self::InvalidWindow(format!(
            "{name} of {days} days reaches past the earliest representable date"
        ))
    }

    pub(crate) fn malformed(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedCadence {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
