use thiserror::Error;

/// Validation failures raised while interpreting caller input.
#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("unknown period: {0}")]
    UnknownPeriod(String),

    #[error("startDate and endDate are required when period=custom")]
    MissingCustomBounds,

    #[error("invalid {field} (expected YYYY-MM-DD or RFC 3339)")]
    InvalidDate { field: &'static str },

    #[error("endDate must be on or after startDate")]
    ReversedRange,

    #[error("date range must lie between 0001-01-01 and 9999-12-31")]
    RangeOutOfBounds,

    #[error("groupBy must be one of: day, week, month")]
    InvalidGroupBy,
}
