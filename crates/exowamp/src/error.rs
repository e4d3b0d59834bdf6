//! # Application Errors
//!
//! The one failure type that crosses the wire by name. A procedure that wants
//! its caller to see a specific error returns an [`ApplicationError`] (usually
//! through `anyhow`); anything else is reported under the generic
//! `ApplicationError` tag with no detail.

use neowamp::APPLICATION_ERROR;
use neowamp::ErrorPayload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationError {
    pub name: String,
    pub message: String,
}

impl ApplicationError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// What gets reported when a procedure fails with something unrecognised.
    pub fn opaque() -> Self {
        Self::new(APPLICATION_ERROR, APPLICATION_ERROR)
    }

    /// Picks the wire-visible error out of a procedure failure.
    pub fn classify(error: &anyhow::Error) -> Self {
        error
            .downcast_ref::<ApplicationError>()
            .cloned()
            .unwrap_or_else(Self::opaque)
    }
}

impl std::fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for ApplicationError {}

impl From<ErrorPayload> for ApplicationError {
    fn from(payload: ErrorPayload) -> Self {
        Self {
            name: payload.name,
            message: payload.message,
        }
    }
}

impl From<ApplicationError> for ErrorPayload {
    fn from(error: ApplicationError) -> Self {
        Self {
            name: error.name,
            message: error.message,
        }
    }
}
