use crate::id::EntityId;

/// What the graph layer knows about a single entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityInfo {
    /// Canonical identifier. Numeric and stable ids of the same entity resolve to the same value.
    pub id: EntityId,
    /// Whether the entity owns a renderable diagram of its own.
    pub owns_diagram: bool,
    pub display_name: Option<String>,
}

/// One container on an ancestor path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathNode {
    pub id: EntityId,
    pub owns_diagram: bool,
}

/// A root-to-entity chain of containers. The last node is the entity itself.
pub type AncestorPath = Vec<PathNode>;

/// Narrow interface to the graph-database query layer.
pub trait GraphLayer: Send + Sync {
    /// Returns `None` when the identifier does not resolve to any entity.
    fn resolve_entity(&self, id: &EntityId) -> Result<Option<EntityInfo>, GraphError>;

    /// Every containment chain from a top-level container down to `id`.
    fn ancestor_paths(&self, id: &EntityId) -> Result<Vec<AncestorPath>, GraphError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("graph layer unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read graph snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid graph snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}
