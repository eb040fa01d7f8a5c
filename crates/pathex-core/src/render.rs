use crate::format::{Format, Quality};
use crate::id::EntityId;
use crate::profile::Profile;
use crate::request::Decoration;
use serde::{Deserialize, Serialize};

/// Declared pixel size of a diagram layout at quality 1:1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// What the render engine is asked to draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    /// Entity whose diagram (or description) is rendered.
    pub owner: EntityId,
    /// Entity the caller asked for; differs from `owner` after ancestor resolution.
    pub requested: EntityId,
    pub format: Format,
    pub profile: Profile,
    pub quality: Quality,
}

/// Narrow interface to the external rendering engines.
///
/// Both methods are blocking calls from the caller's point of view; async callers run them on
/// the blocking pool.
pub trait RenderEngine: Send + Sync {
    /// Declared layout size of `target`, used to estimate admission cost. Engines that cannot
    /// tell return `None` and the caller falls back to a configured estimate.
    fn measure(&self, _target: &RenderTarget) -> Result<Option<Dimensions>, RenderError> {
        Ok(None)
    }

    fn render(&self, target: &RenderTarget, decoration: &Decoration)
        -> Result<Vec<u8>, RenderError>;
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("nothing to render for {0}")]
    NotFound(EntityId),

    #[error("profile {0} is not supported by the render engine")]
    UnsupportedProfile(String),

    #[error("{0}")]
    Engine(String),
}
