use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("color `{value}` is not part of the palette")]
    UnknownColor { value: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unknown_color(value: impl Into<String>) -> Self {
        Self::UnknownColor {
            value: value.into(),
        }
    }
}
