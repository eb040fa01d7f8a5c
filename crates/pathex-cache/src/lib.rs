//! Persistent state of the export façade.
//!
//! - [`AncestorResolver`] maps a requested entity onto the diagram that is actually rendered.
//! - [`ArtifactCache`] stores rendered artifacts per release under a [`CacheKey`] derived from
//!   that owner, and hands out ephemeral files for decorated requests.
//! - [`TokenStore`] keeps user-submitted results under a content-derived [`Token`], with TTL and
//!   size-budget eviction driven by [`spawn_sweeper`].
//!
//! All writes go through [`atomic_write`]; no reader ever observes a partially written file.

mod artifact;
mod error;
mod key;
mod release;
mod resolver;
mod sweeper;
mod token;
mod token_store;
mod util;

pub use artifact::{Artifact, ArtifactCache, CachedArtifact, EphemeralArtifact, EPHEMERAL_DIR_NAME};
pub use error::CacheError;
pub use key::CacheKey;
pub use release::{prune_stale_releases, PruneReport};
pub use resolver::{AncestorResolver, DiagramOwner};
pub use sweeper::spawn_sweeper;
pub use token::Token;
pub use token_store::{
    SaveOutcome, SweepReport, TokenStore, TokenStorePolicy, TOKEN_STORE_SCHEMA_VERSION,
};
pub use util::{atomic_write, now_millis};
