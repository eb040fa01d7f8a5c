use crate::graph::{AncestorPath, EntityInfo, GraphError, GraphLayer, PathNode};
use crate::id::EntityId;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Upper bound on the number of containment chains enumerated for one entity. Heavily shared
/// sub-pathways can otherwise fan out combinatorially.
const MAX_ANCESTOR_PATHS: usize = 4096;

/// One row of a graph snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SnapshotEntity {
    pub id: EntityId,
    /// Numeric database id that aliases `id`.
    #[serde(default)]
    pub db_id: Option<u64>,
    #[serde(default)]
    pub owns_diagram: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Direct containers of this entity.
    #[serde(default)]
    pub parents: Vec<EntityId>,
}

impl SnapshotEntity {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            db_id: None,
            owns_diagram: false,
            display_name: None,
            parents: Vec::new(),
        }
    }

    pub fn with_db_id(mut self, db_id: u64) -> Self {
        self.db_id = Some(db_id);
        self
    }

    pub fn owning_diagram(mut self) -> Self {
        self.owns_diagram = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parents.push(parent);
        self
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    entities: Vec<SnapshotEntity>,
}

/// A [`GraphLayer`] over an in-memory entity table.
///
/// The table is either built programmatically or loaded from a JSON snapshot of the form
/// `{ "entities": [ { "id": "R-HSA-1", "db_id": 1, "owns_diagram": true, "parents": [] } ] }`.
#[derive(Clone, Debug, Default)]
pub struct SnapshotGraph {
    entities: HashMap<EntityId, SnapshotEntity>,
    aliases: HashMap<EntityId, EntityId>,
}

impl SnapshotGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: impl IntoIterator<Item = SnapshotEntity>) -> Self {
        let mut graph = Self::new();
        for entity in entities {
            graph.insert(entity);
        }
        graph
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, GraphError> {
        let file: SnapshotFile = serde_json::from_reader(reader)?;
        Ok(Self::from_entities(file.entities))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let graph = Self::from_reader(std::io::BufReader::new(file))?;
        tracing::info!(
            target: "pathex.graph",
            path = %path.display(),
            entities = graph.len(),
            "loaded graph snapshot"
        );
        Ok(graph)
    }

    pub fn insert(&mut self, entity: SnapshotEntity) {
        if let Some(db_id) = entity.db_id {
            self.aliases
                .insert(EntityId::Numeric(db_id), entity.id.clone());
        }
        self.entities.insert(entity.id.clone(), entity);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn canonical(&self, id: &EntityId) -> Option<&SnapshotEntity> {
        self.entities
            .get(id)
            .or_else(|| self.aliases.get(id).and_then(|alias| self.entities.get(alias)))
    }

    fn collect_paths(
        &self,
        entity: &SnapshotEntity,
        chain: &mut Vec<PathNode>,
        out: &mut Vec<AncestorPath>,
    ) {
        chain.push(PathNode {
            id: entity.id.clone(),
            owns_diagram: entity.owns_diagram,
        });

        let parents: Vec<&SnapshotEntity> = entity
            .parents
            .iter()
            .filter_map(|parent| self.canonical(parent))
            // A containment cycle would otherwise never reach a root.
            .filter(|parent| !chain.iter().any(|node| node.id == parent.id))
            .collect();

        if parents.is_empty() {
            out.push(chain.iter().rev().cloned().collect());
        } else {
            for parent in parents {
                if out.len() >= MAX_ANCESTOR_PATHS {
                    break;
                }
                self.collect_paths(parent, chain, out);
            }
        }

        chain.pop();
    }
}

impl GraphLayer for SnapshotGraph {
    fn resolve_entity(&self, id: &EntityId) -> Result<Option<EntityInfo>, GraphError> {
        Ok(self.canonical(id).map(|entity| EntityInfo {
            id: entity.id.clone(),
            owns_diagram: entity.owns_diagram,
            display_name: entity.display_name.clone(),
        }))
    }

    fn ancestor_paths(&self, id: &EntityId) -> Result<Vec<AncestorPath>, GraphError> {
        let Some(entity) = self.canonical(id) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        self.collect_paths(entity, &mut Vec::new(), &mut out);
        Ok(out)
    }
}
