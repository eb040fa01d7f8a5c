use crate::format::{ArtifactKind, Format, Quality};
use crate::id::EntityId;
use crate::profile::Profile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-request overlay drawn on top of a render.
///
/// A non-empty decoration makes the request *decorated*: it is always rendered fresh, never
/// read from or written to the artifact cache, and any file produced for it is removed once
/// the response is done.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoration {
    selected: BTreeSet<String>,
    flagged: BTreeSet<String>,
    analysis_token: Option<String>,
}

impl Decoration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selected<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected.extend(non_blank(ids));
        self
    }

    pub fn with_flagged<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flagged.extend(non_blank(ids));
        self
    }

    pub fn with_analysis_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        if !token.trim().is_empty() {
            self.analysis_token = Some(token.trim().to_string());
        }
        self
    }

    pub fn selected(&self) -> &BTreeSet<String> {
        &self.selected
    }

    pub fn flagged(&self) -> &BTreeSet<String> {
        &self.flagged
    }

    pub fn analysis_token(&self) -> Option<&str> {
        self.analysis_token.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty() && self.flagged.is_empty() && self.analysis_token.is_none()
    }
}

fn non_blank<I, S>(ids: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter().filter_map(|id| {
        let id = id.into();
        let trimmed = id.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// A validated export request. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderRequest {
    id: EntityId,
    format: Format,
    profile: Profile,
    quality: Quality,
    decoration: Decoration,
}

impl RenderRequest {
    pub fn new(id: EntityId, format: Format, profile: Profile, quality: Quality) -> Self {
        Self {
            id,
            format,
            profile,
            quality,
            decoration: Decoration::default(),
        }
    }

    pub fn with_decoration(mut self, decoration: Decoration) -> Self {
        self.decoration = decoration;
        self
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn kind(&self) -> ArtifactKind {
        self.format.kind()
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn decoration(&self) -> &Decoration {
        &self.decoration
    }

    pub fn is_decorated(&self) -> bool {
        !self.decoration.is_empty()
    }
}
