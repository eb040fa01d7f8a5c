//! The pathex export service.
//!
//! [`export::Exporter`] runs a render request end to end: ancestor resolution, artifact cache
//! lookup, admission through the raster or document gate, and rendering through a
//! [`pathex_core::RenderEngine`]. [`interactors::InteractorService`] stores custom interactor
//! submissions in the token store. [`http::router`] exposes both over HTTP, and
//! [`adapters::CommandRenderEngine`] drives an external render program.

pub mod adapters;
pub mod export;
pub mod http;
pub mod interactors;

pub use adapters::CommandRenderEngine;
pub use export::{Endpoint, ExportQuery, ExportSettings, ExportedArtifact, Exporter};
pub use http::{router, AppState};
pub use interactors::{InteractorService, SubmissionSummary};
