use crate::graph::GraphError;
use crate::id::EntityId;
use crate::render::RenderError;

/// Rejections of request shape: identifiers, formats, qualities and profiles.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid identifier {value:?}: {reason}")]
    InvalidId { value: String, reason: &'static str },

    #[error("unsupported format {0:?}")]
    UnsupportedFormat(String),

    #[error("format {format} is not available from this endpoint")]
    FormatNotServed { format: String },

    #[error("quality {value} is outside {min}..={max}")]
    QualityOutOfRange { value: i64, min: u8, max: u8 },

    #[error("invalid quality range {min}..={max} with default {default}")]
    InvalidQualityRange { min: u8, max: u8, default: u8 },

    #[error("unknown profile {0:?}")]
    UnknownProfile(String),
}

/// Errors surfaced by an export to its caller.
///
/// Waiting for capacity is not an error; [`ExportError::Unavailable`] only appears when a bounded
/// admission wait has been configured and exceeded.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("{id} not found: {reason}")]
    NotFound { id: EntityId, reason: &'static str },

    #[error("unsupported request: {0}")]
    Unsupported(String),

    #[error("export capacity unavailable after waiting {waited_ms} ms")]
    Unavailable { waited_ms: u64 },

    #[error("request cancelled before admission")]
    Cancelled,

    #[error("render engine failed: {0}")]
    Engine(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ParseError> for ExportError {
    fn from(err: ParseError) -> Self {
        ExportError::Unsupported(err.to_string())
    }
}

impl From<RenderError> for ExportError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::NotFound(id) => ExportError::NotFound {
                id,
                reason: "the render engine has nothing to render",
            },
            RenderError::UnsupportedProfile(profile) => {
                ExportError::Unsupported(format!("profile {profile:?} is not supported"))
            }
            RenderError::Engine(message) => ExportError::Engine(message),
        }
    }
}
