use pathex_core::{EntityId, ExportError, GraphLayer};
use std::sync::Arc;

/// Outcome of mapping a requested entity onto the diagram that actually gets rendered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagramOwner {
    /// Canonical id of the requested entity.
    pub requested: EntityId,
    /// Entity whose diagram is rendered. Equal to `requested` when it owns one, or when no
    /// ancestor does.
    pub owner: EntityId,
    /// `false` when neither the entity nor any of its ancestors owns a diagram.
    pub renderable: bool,
    pub display_name: Option<String>,
}

impl DiagramOwner {
    pub fn is_delegated(&self) -> bool {
        self.owner != self.requested
    }
}

/// Finds the nearest diagram-owning container of an entity.
///
/// The answer is recomputed from the graph on every call so that graph updates are picked up
/// without invalidation.
#[derive(Clone)]
pub struct AncestorResolver {
    graph: Arc<dyn GraphLayer>,
}

impl AncestorResolver {
    pub fn new(graph: Arc<dyn GraphLayer>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Arc<dyn GraphLayer> {
        &self.graph
    }

    /// Returns the entity itself when it owns a diagram. Otherwise walks every ancestor path
    /// upward and picks the owning ancestor with the fewest hops; among equally near ones the
    /// first encountered (path order, then position) wins.
    pub fn resolve_diagram_owner(&self, id: &EntityId) -> Result<DiagramOwner, ExportError> {
        let Some(info) = self.graph.resolve_entity(id)? else {
            return Err(ExportError::NotFound {
                id: id.clone(),
                reason: "unknown entity",
            });
        };

        if info.owns_diagram {
            return Ok(DiagramOwner {
                requested: info.id.clone(),
                owner: info.id,
                renderable: true,
                display_name: info.display_name,
            });
        }

        let paths = self.graph.ancestor_paths(&info.id)?;
        let mut best: Option<(usize, EntityId)> = None;
        for path in &paths {
            // Anchor on the last occurrence of the entity; anything after it is not an ancestor.
            let Some(position) = path.iter().rposition(|node| node.id == info.id) else {
                continue;
            };
            for (depth, node) in path[..position].iter().rev().enumerate() {
                if !node.owns_diagram {
                    continue;
                }
                if best.as_ref().map_or(true, |(best_depth, _)| depth < *best_depth) {
                    best = Some((depth, node.id.clone()));
                }
                break;
            }
        }

        match best {
            Some((depth, owner)) => {
                tracing::debug!(
                    target: "pathex.cache",
                    requested = %info.id,
                    %owner,
                    hops = depth + 1,
                    "delegating render to nearest diagram-owning ancestor"
                );
                Ok(DiagramOwner {
                    requested: info.id,
                    owner,
                    renderable: true,
                    display_name: info.display_name,
                })
            }
            None => Ok(DiagramOwner {
                requested: info.id.clone(),
                owner: info.id,
                renderable: false,
                display_name: info.display_name,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathex_core::{SnapshotEntity, SnapshotGraph};

    fn id(raw: &str) -> EntityId {
        EntityId::parse(raw).unwrap()
    }

    fn resolver(entities: Vec<SnapshotEntity>) -> AncestorResolver {
        AncestorResolver::new(Arc::new(SnapshotGraph::from_entities(entities)))
    }

    #[test]
    fn diagram_owner_resolves_to_itself() {
        let resolver = resolver(vec![SnapshotEntity::new(id("P1")).owning_diagram()]);
        let owner = resolver.resolve_diagram_owner(&id("P1")).unwrap();
        assert_eq!(owner.owner, id("P1"));
        assert!(owner.renderable);
        assert!(!owner.is_delegated());
    }

    #[test]
    fn nearest_owner_wins_across_paths() {
        // P1 (owner) -> S1 -> E1 and P2 (owner) -> E1: P2 is one hop, P1 two.
        let resolver = resolver(vec![
            SnapshotEntity::new(id("P1")).owning_diagram(),
            SnapshotEntity::new(id("S1")).with_parent(id("P1")),
            SnapshotEntity::new(id("P2")).owning_diagram(),
            SnapshotEntity::new(id("E1"))
                .with_parent(id("S1"))
                .with_parent(id("P2")),
        ]);
        let owner = resolver.resolve_diagram_owner(&id("E1")).unwrap();
        assert_eq!(owner.owner, id("P2"));
        assert!(owner.is_delegated());
    }

    #[test]
    fn ties_keep_the_first_path() {
        let resolver = resolver(vec![
            SnapshotEntity::new(id("P1")).owning_diagram(),
            SnapshotEntity::new(id("P2")).owning_diagram(),
            SnapshotEntity::new(id("E1"))
                .with_parent(id("P1"))
                .with_parent(id("P2")),
        ]);
        let owner = resolver.resolve_diagram_owner(&id("E1")).unwrap();
        assert_eq!(owner.owner, id("P1"));
    }

    #[test]
    fn unowned_entity_is_not_renderable() {
        let resolver = resolver(vec![
            SnapshotEntity::new(id("S1")),
            SnapshotEntity::new(id("E1")).with_parent(id("S1")),
        ]);
        let owner = resolver.resolve_diagram_owner(&id("E1")).unwrap();
        assert!(!owner.renderable);
        assert_eq!(owner.owner, id("E1"));
    }

    #[test]
    fn unknown_entity_is_not_found() {
        let resolver = resolver(Vec::new());
        let err = resolver.resolve_diagram_owner(&id("R-HSA-0")).unwrap_err();
        assert!(matches!(err, ExportError::NotFound { .. }));
    }

    #[test]
    fn numeric_alias_resolves_through_canonical_id() {
        let resolver = resolver(vec![
            SnapshotEntity::new(id("P1")).owning_diagram(),
            SnapshotEntity::new(id("E1"))
                .with_db_id(42)
                .named("Glycolysis step")
                .with_parent(id("P1")),
        ]);
        let owner = resolver.resolve_diagram_owner(&id("42")).unwrap();
        assert_eq!(owner.requested, id("E1"));
        assert_eq!(owner.owner, id("P1"));
        assert_eq!(owner.display_name.as_deref(), Some("Glycolysis step"));
    }
}
