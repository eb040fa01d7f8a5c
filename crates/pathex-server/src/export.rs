use pathex_cache::{AncestorResolver, Artifact, ArtifactCache, CacheKey, DiagramOwner};
use pathex_config::PathexConfig;
use pathex_core::{
    ArtifactKind, Decoration, EntityId, ExportError, Format, GraphLayer, ParseError, ProfileSet,
    QualityRange, RenderEngine, RenderError, RenderRequest, RenderTarget,
};
use pathex_gate::{
    AdmissionTicket, CancellationToken, Cost, CostEstimator, CostModel, CountingGate, WeightedGate,
};
use std::sync::Arc;
use std::time::Duration;

/// The three GET surfaces, each serving a fixed subset of formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Diagram,
    Document,
    Event,
}

impl Endpoint {
    pub fn serves(self, format: Format) -> bool {
        match self {
            Endpoint::Diagram => matches!(
                format.kind(),
                ArtifactKind::Raster | ArtifactKind::SlideDeck
            ),
            Endpoint::Document => format == Format::Pdf,
            Endpoint::Event => format.kind() == ArtifactKind::ExchangeFormat,
        }
    }
}

/// Caller-supplied request fields before validation.
#[derive(Clone, Debug, Default)]
pub struct ExportQuery {
    pub quality: Option<i64>,
    pub profile: Option<String>,
    /// Comma-separated identifiers to select.
    pub selected: Option<String>,
    /// Comma-separated identifiers to flag.
    pub flagged: Option<String>,
    pub analysis_token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ExportSettings {
    pub raster_capacity: Cost,
    pub document_limit: usize,
    /// Concurrent layout measurements ahead of the raster gate.
    pub measure_limit: usize,
    pub acquire_timeout: Option<Duration>,
    pub cost_model: CostModel,
    pub profiles: ProfileSet,
    pub qualities: QualityRange,
}

impl ExportSettings {
    pub fn from_config(config: &PathexConfig) -> Result<Self, ParseError> {
        Ok(Self {
            raster_capacity: Cost::from_mib(config.admission.raster_capacity_mib),
            document_limit: config.admission.document_limit,
            measure_limit: config.admission.measure_limit,
            acquire_timeout: config.admission.acquire_timeout(),
            cost_model: CostModel {
                bytes_per_pixel: config.cost.bytes_per_pixel,
                scale_per_quality: config.cost.scale_per_quality,
                unknown_size_bytes: config.cost.unknown_size_mib.saturating_mul(1024 * 1024),
            },
            profiles: config.render.profile_set()?,
            qualities: config.render.quality_range()?,
        })
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            raster_capacity: Cost::from_mib(1024),
            document_limit: 4,
            measure_limit: 8,
            acquire_timeout: None,
            cost_model: CostModel::default(),
            profiles: ProfileSet::default(),
            qualities: QualityRange::default(),
        }
    }
}

/// A finished export, ready to stream.
#[derive(Debug)]
pub struct ExportedArtifact {
    pub artifact: Artifact,
    pub format: Format,
    /// Entity whose diagram (or description) was rendered.
    pub owner: EntityId,
    /// `Content-Disposition` file name, already sanitised.
    pub file_name: String,
    pub cache_hit: bool,
}

impl ExportedArtifact {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Runs render requests: resolve, serve from cache, or admit through the right gate and render.
pub struct Exporter {
    graph: Arc<dyn GraphLayer>,
    resolver: AncestorResolver,
    engine: Arc<dyn RenderEngine>,
    cache: ArtifactCache,
    raster_gate: WeightedGate,
    document_gate: CountingGate,
    measure_gate: CountingGate,
    estimator: CostEstimator,
    profiles: ProfileSet,
    qualities: QualityRange,
}

impl Exporter {
    pub fn new(
        graph: Arc<dyn GraphLayer>,
        engine: Arc<dyn RenderEngine>,
        cache: ArtifactCache,
        settings: ExportSettings,
    ) -> Self {
        Self {
            resolver: AncestorResolver::new(graph.clone()),
            graph,
            engine,
            cache,
            raster_gate: WeightedGate::new("raster", settings.raster_capacity)
                .with_wait_timeout(settings.acquire_timeout),
            document_gate: CountingGate::new("document", settings.document_limit)
                .with_wait_timeout(settings.acquire_timeout),
            measure_gate: CountingGate::new("measure", settings.measure_limit)
                .with_wait_timeout(settings.acquire_timeout),
            estimator: CostEstimator::new(settings.cost_model),
            profiles: settings.profiles,
            qualities: settings.qualities,
        }
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn raster_gate(&self) -> &WeightedGate {
        &self.raster_gate
    }

    pub fn document_gate(&self) -> &CountingGate {
        &self.document_gate
    }

    pub fn measure_gate(&self) -> &CountingGate {
        &self.measure_gate
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    pub fn qualities(&self) -> &QualityRange {
        &self.qualities
    }

    /// Fails every waiter at every gate. Used on shutdown.
    pub fn close(&self) {
        self.raster_gate.close();
        self.document_gate.close();
        self.measure_gate.close();
    }

    /// Validates the shape of a request addressed as `<id>.<ext>` on `endpoint`.
    pub fn parse_request(
        &self,
        endpoint: Endpoint,
        file: &str,
        query: &ExportQuery,
    ) -> Result<RenderRequest, ExportError> {
        let Some((raw_id, ext)) = file.rsplit_once('.') else {
            return Err(ParseError::UnsupportedFormat(file.to_owned()).into());
        };
        let id = EntityId::parse(raw_id)?;
        let format = Format::from_extension(ext)?;
        if !endpoint.serves(format) {
            return Err(ParseError::FormatNotServed {
                format: ext.to_ascii_lowercase(),
            }
            .into());
        }
        let profile = self.profiles.resolve(query.profile.as_deref())?;
        let quality = self.qualities.parse(query.quality)?;

        let mut decoration = Decoration::new()
            .with_selected(split_list(query.selected.as_deref()))
            .with_flagged(split_list(query.flagged.as_deref()));
        if let Some(token) = query.analysis_token.as_deref() {
            decoration = decoration.with_analysis_token(token);
        }

        Ok(RenderRequest::new(id, format, profile, quality).with_decoration(decoration))
    }

    /// Serves `request`.
    ///
    /// Resolution and validation failures return before any gate is touched. A cache hit
    /// returns without admission. Otherwise the request is admitted by artifact kind, and the
    /// admission ticket travels with the render onto the blocking pool so that it is released
    /// when the render finishes, even if this future has been dropped by then.
    pub async fn export(
        &self,
        request: &RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<ExportedArtifact, ExportError> {
        let format = request.format();
        let resolved = self.resolve(request.id(), format)?;
        let file_name = attachment_file_name(
            resolved.display_name.as_deref(),
            &resolved.requested,
            format,
        );
        let target = RenderTarget {
            owner: resolved.owner.clone(),
            requested: resolved.requested.clone(),
            format,
            profile: request.profile().clone(),
            quality: request.quality(),
        };
        let key = (!request.is_decorated()).then(|| {
            CacheKey::new(
                target.owner.clone(),
                target.profile.clone(),
                format,
                target.quality,
            )
        });

        if let Some(hit) = key.as_ref().and_then(|key| self.cache.get(key)) {
            tracing::debug!(
                target: "pathex.export",
                requested = %target.requested,
                owner = %target.owner,
                %format,
                "served from cache"
            );
            return Ok(ExportedArtifact {
                artifact: Artifact::Cached(hit),
                format,
                owner: resolved.owner,
                file_name,
                cache_hit: true,
            });
        }

        let ticket = self.admit(&target, cancel).await?;

        let cache = self.cache.clone();
        let engine = self.engine.clone();
        let decoration = request.decoration().clone();
        let render_target = target.clone();
        let rendered = tokio::task::spawn_blocking(move || {
            // Held until the render and the cache write are done, on every exit path.
            let _ticket: Option<AdmissionTicket> = ticket;
            cache.lookup_or_render(key.as_ref(), format, || {
                engine.render(&render_target, &decoration)
            })
        })
        .await;

        let artifact = match rendered {
            Ok(Ok(artifact)) => artifact,
            Ok(Err(err)) => {
                log_render_failure(&target, &err);
                return Err(err.into());
            }
            Err(join_err) => {
                tracing::error!(
                    target: "pathex.export",
                    owner = %target.owner,
                    %format,
                    error = %join_err,
                    "render task failed"
                );
                return Err(ExportError::Internal("render task failed".to_owned()));
            }
        };

        tracing::info!(
            target: "pathex.export",
            requested = %target.requested,
            owner = %target.owner,
            %format,
            profile = %target.profile,
            quality = target.quality.get(),
            bytes = artifact.len(),
            ephemeral = artifact.is_ephemeral(),
            in_memory = artifact.is_in_memory(),
            "rendered artifact"
        );
        Ok(ExportedArtifact {
            artifact,
            format,
            owner: resolved.owner,
            file_name,
            cache_hit: false,
        })
    }

    fn resolve(&self, id: &EntityId, format: Format) -> Result<DiagramOwner, ExportError> {
        if format.requires_diagram() {
            let resolved = self.resolver.resolve_diagram_owner(id)?;
            if !resolved.renderable {
                return Err(ExportError::NotFound {
                    id: resolved.requested,
                    reason: "neither the entity nor any ancestor has a diagram",
                });
            }
            return Ok(resolved);
        }

        let Some(info) = self.graph.resolve_entity(id)? else {
            return Err(ExportError::NotFound {
                id: id.clone(),
                reason: "unknown entity",
            });
        };
        Ok(DiagramOwner {
            requested: info.id.clone(),
            owner: info.id,
            renderable: true,
            display_name: info.display_name,
        })
    }

    async fn admit(
        &self,
        target: &RenderTarget,
        cancel: &CancellationToken,
    ) -> Result<Option<AdmissionTicket>, ExportError> {
        match target.format.kind() {
            ArtifactKind::Raster => {
                let cost = if target.format.is_pixel_bounded() {
                    let dimensions = self.measure(target, cancel).await?;
                    self.estimator
                        .estimate(target.format, dimensions, target.quality)
                } else {
                    Cost::ZERO
                };
                Ok(Some(self.raster_gate.acquire(cost, cancel).await?))
            }
            ArtifactKind::Document => Ok(Some(self.document_gate.acquire(cancel).await?)),
            ArtifactKind::SlideDeck | ArtifactKind::ExchangeFormat => Ok(None),
        }
    }

    /// Asks the engine for the layout size. Measuring runs a layout pass, so it is bounded by
    /// its own gate; the ticket rides along with the blocking task.
    async fn measure(
        &self,
        target: &RenderTarget,
        cancel: &CancellationToken,
    ) -> Result<Option<pathex_core::Dimensions>, ExportError> {
        let ticket = self.measure_gate.acquire(cancel).await?;
        let engine = self.engine.clone();
        let measured_target = target.clone();
        let measured = tokio::task::spawn_blocking(move || {
            let _ticket = ticket;
            engine.measure(&measured_target)
        })
        .await
            .map_err(|err| ExportError::Internal(format!("measure task failed: {err}")))?;
        match measured {
            Ok(dimensions) => Ok(dimensions),
            Err(RenderError::Engine(message)) => {
                tracing::warn!(
                    target: "pathex.export",
                    owner = %target.owner,
                    error = %message,
                    "failed to measure layout; charging the unknown-size estimate"
                );
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn log_render_failure(target: &RenderTarget, err: &RenderError) {
    match err {
        RenderError::NotFound(_) | RenderError::UnsupportedProfile(_) => tracing::info!(
            target: "pathex.export",
            owner = %target.owner,
            format = %target.format,
            error = %err,
            "render engine rejected request"
        ),
        RenderError::Engine(_) => tracing::error!(
            target: "pathex.export",
            owner = %target.owner,
            format = %target.format,
            profile = %target.profile,
            error = %err,
            "render engine failed"
        ),
    }
}

fn split_list(raw: Option<&str>) -> Vec<&str> {
    raw.map(|raw| raw.split(',').collect()).unwrap_or_default()
}

const MAX_FILE_STEM_CHARS: usize = 128;

/// `<stem>.<ext>` where the stem is the display name with anything outside
/// `[A-Za-z0-9 ._-]` replaced by `_`, or the identifier when no usable name exists.
pub fn attachment_file_name(display_name: Option<&str>, id: &EntityId, format: Format) -> String {
    let sanitised = display_name
        .map(|name| {
            name.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-') {
                        c
                    } else {
                        '_'
                    }
                })
                .take(MAX_FILE_STEM_CHARS)
                .collect::<String>()
        })
        .map(|name| name.trim_matches(|c| c == ' ' || c == '.' || c == '_').to_owned())
        .filter(|name| !name.is_empty());

    let stem = sanitised.unwrap_or_else(|| id.to_string());
    format!("{stem}.{}", format.extension())
}
