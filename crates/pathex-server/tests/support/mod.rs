#![allow(dead_code)]

use pathex_cache::{ArtifactCache, TokenStore, TokenStorePolicy};
use pathex_core::{
    Decoration, Dimensions, EntityId, Format, GraphLayer, RenderEngine, RenderError, RenderTarget,
    SnapshotEntity, SnapshotGraph,
};
use pathex_server::{AppState, ExportSettings, Exporter, InteractorService};
use pathex_gate::CancellationToken;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const RELEASE: u32 = 88;

pub fn id(raw: &str) -> EntityId {
    EntityId::parse(raw).unwrap()
}

/// ```text
/// P1 (diagram, "Signal Transduction")
/// └── E1
///     └── E2 (diagram)
/// D1..D5 (diagram)
/// LONE (no diagram, no containers)
/// BAD (diagram; the engine always fails on it)
/// ```
pub fn graph() -> SnapshotGraph {
    let mut entities = vec![
        SnapshotEntity::new(id("R-HSA-P1"))
            .with_db_id(100)
            .owning_diagram()
            .named("Signal Transduction"),
        SnapshotEntity::new(id("R-HSA-E1"))
            .named("Receptor binding")
            .with_parent(id("R-HSA-P1")),
        SnapshotEntity::new(id("R-HSA-E2"))
            .owning_diagram()
            .with_parent(id("R-HSA-E1")),
        SnapshotEntity::new(id("R-HSA-LONE")),
        SnapshotEntity::new(id("R-HSA-BAD")).owning_diagram(),
    ];
    for n in 1..=5 {
        entities.push(SnapshotEntity::new(id(&format!("R-HSA-D{n}"))).owning_diagram());
    }
    SnapshotGraph::from_entities(entities)
}

/// Deterministic engine: output depends only on what is rendered, never on who asked.
#[derive(Default)]
pub struct FakeEngine {
    pub renders: AtomicUsize,
    pub measures: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub measuring: AtomicUsize,
    pub max_measuring: AtomicUsize,
    pub delay: Duration,
    pub measure_delay: Duration,
    pub dimensions: Option<Dimensions>,
    pub seen: Mutex<Vec<RenderTarget>>,
}

impl FakeEngine {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn expected_bytes(owner: &EntityId, format: Format, decorated: bool) -> Vec<u8> {
        format!("{owner}|{format}|{decorated}").into_bytes()
    }
}

impl RenderEngine for FakeEngine {
    fn measure(&self, _target: &RenderTarget) -> Result<Option<Dimensions>, RenderError> {
        self.measures.fetch_add(1, Ordering::SeqCst);
        let measuring = self.measuring.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_measuring.fetch_max(measuring, Ordering::SeqCst);
        if !self.measure_delay.is_zero() {
            std::thread::sleep(self.measure_delay);
        }
        self.measuring.fetch_sub(1, Ordering::SeqCst);
        Ok(self.dimensions)
    }

    fn render(
        &self,
        target: &RenderTarget,
        decoration: &Decoration,
    ) -> Result<Vec<u8>, RenderError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(target.clone());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if target.owner == id("R-HSA-BAD") {
            return Err(RenderError::Engine("layout exploded".to_owned()));
        }
        Ok(Self::expected_bytes(
            &target.owner,
            target.format,
            !decoration.is_empty(),
        ))
    }
}

pub struct Fixture {
    pub tmp: TempDir,
    pub engine: Arc<FakeEngine>,
    pub exporter: Arc<Exporter>,
}

impl Fixture {
    pub fn new(engine: FakeEngine, settings: ExportSettings) -> Self {
        let tmp = TempDir::new().unwrap();
        let engine = Arc::new(engine);
        let graph: Arc<dyn GraphLayer> = Arc::new(graph());
        let cache = ArtifactCache::open(tmp.path().join("artifacts"), RELEASE).unwrap();
        let exporter = Arc::new(Exporter::new(graph, engine.clone(), cache, settings));
        Self {
            tmp,
            engine,
            exporter,
        }
    }

    pub fn app_state(&self) -> Arc<AppState> {
        let tokens =
            TokenStore::open(self.tmp.path().join("tokens"), TokenStorePolicy::default()).unwrap();
        Arc::new(AppState {
            exporter: self.exporter.clone(),
            interactors: InteractorService::new(Arc::new(tokens), 64 * 1024),
            shutdown: CancellationToken::new(),
        })
    }
}
