//! Shared vocabulary for the pathex export façade.
//!
//! This crate owns the types every other `pathex-*` crate speaks in:
//! - [`EntityId`], [`Format`], [`Profile`] and [`Quality`], the validated pieces of a request
//! - [`RenderRequest`] and its per-request [`Decoration`]
//! - the narrow interfaces to the external collaborators, [`GraphLayer`] and [`RenderEngine`]
//! - [`SnapshotGraph`], an in-memory [`GraphLayer`] loadable from a JSON snapshot
//! - the [`ExportError`] taxonomy surfaced to callers
//!
//! Nothing here performs I/O apart from [`SnapshotGraph::load`].

mod error;
mod format;
mod graph;
mod id;
mod profile;
mod render;
mod request;
mod snapshot;

pub use error::{ExportError, ParseError};
pub use format::{ArtifactKind, Format, Quality, QualityRange};
pub use graph::{AncestorPath, EntityInfo, GraphError, GraphLayer, PathNode};
pub use id::EntityId;
pub use profile::{Profile, ProfileSet};
pub use render::{Dimensions, RenderEngine, RenderError, RenderTarget};
pub use request::{Decoration, RenderRequest};
pub use snapshot::{SnapshotEntity, SnapshotGraph};
