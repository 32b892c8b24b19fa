use thiserror::Error;

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced to callers of the projection API.
///
/// Render failures normally never reach a caller: the session swaps in an
/// error placeholder instead. The variant exists so hosts can report them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("screen '{0}' not found")]
    NotFound(String),

    #[error("car host not available: {0}")]
    HostUnavailable(String),

    #[error("template render failed: {0}")]
    RenderFailure(String),

    #[error("projection bridge unavailable")]
    BridgeUnavailable,

    #[error("malformed wire payload: {0}")]
    Wire(String),
}

impl BridgeError {
    /// Stable code handed to promise rejections on the application side.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::HostUnavailable(_) => "HOST_UNAVAILABLE",
            Self::RenderFailure(_) => "RENDER_FAILURE",
            Self::BridgeUnavailable => "BRIDGE_UNAVAILABLE",
            Self::Wire(_) => "WIRE_FORMAT",
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Wire(err.to_string())
    }
}

/// Raised by a [`crate::CarHost`] when a template cannot be built.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<RenderError> for BridgeError {
    fn from(err: RenderError) -> Self {
        Self::RenderFailure(err.message)
    }
}
