use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Malformed recurrence rule: {0}")]
    MalformedRule(String),

    #[error("Invalid {field} value {value:?}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Calendar parsing failed: {0}")]
    Parse(String),

    #[error("Unknown time zone: {0}")]
    UnknownTimeZone(String),

    #[error("Date out of range: {0}")]
    DateOutOfRange(String),

    #[error("Failed to read input: {0}")]
    UnreadableInput(#[source] std::io::Error),

    #[error("Failed to write output: {0}")]
    UnwritableOutput(#[source] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
