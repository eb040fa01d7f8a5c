use crate::diagnostics::{ConfigWarning, ValidationDiagnostics};
use crate::{LoggingConfig, PathexConfig};

impl PathexConfig {
    /// Validate semantic invariants.
    ///
    /// Reports as many problems as possible in one pass.
    #[must_use]
    pub fn validate(&self) -> ValidationDiagnostics {
        let mut out = ValidationDiagnostics::default();

        if self.release_version == 0 {
            out.error("release_version", "must be >= 1");
        }
        validate_server(self, &mut out);
        validate_storage(self, &mut out);
        validate_admission(self, &mut out);
        validate_cost(self, &mut out);
        validate_render(self, &mut out);
        validate_logging(self, &mut out);

        out
    }
}

fn validate_server(config: &PathexConfig, out: &mut ValidationDiagnostics) {
    if config.server.max_upload_bytes.bytes() == 0 {
        out.error("server.max_upload_bytes", "must be >= 1");
    }
    if config.server.fetch_timeout_secs == 0 {
        out.error("server.fetch_timeout_secs", "must be >= 1");
    }
}

fn validate_storage(config: &PathexConfig, out: &mut ValidationDiagnostics) {
    let tokens = &config.tokens;
    if tokens.high_water_bytes.bytes() == 0 {
        out.error("tokens.high_water_bytes", "must be >= 1");
    }
    if tokens.low_water_bytes >= tokens.high_water_bytes {
        out.error(
            "tokens.low_water_bytes",
            format!(
                "must be below tokens.high_water_bytes ({} >= {})",
                tokens.low_water_bytes, tokens.high_water_bytes
            ),
        );
    }
    if tokens.ttl_secs == 0 {
        out.error("tokens.ttl_secs", "must be >= 1");
    }
    if tokens.sweep_interval_secs == 0 {
        out.error("tokens.sweep_interval_secs", "must be >= 1");
    }
    if tokens.root == config.cache.root {
        out.error("tokens.root", "must differ from cache.root");
    }
}

fn validate_admission(config: &PathexConfig, out: &mut ValidationDiagnostics) {
    let admission = &config.admission;
    if admission.raster_capacity_mib == 0 {
        out.error("admission.raster_capacity_mib", "must be >= 1");
    }
    if admission.document_limit == 0 {
        out.error("admission.document_limit", "must be >= 1");
    }
    if admission.measure_limit == 0 {
        out.error("admission.measure_limit", "must be >= 1");
    }
    if admission.acquire_timeout_ms == Some(0) {
        out.error(
            "admission.acquire_timeout_ms",
            "must be >= 1; omit it to wait without a bound",
        );
    }
    if admission.raster_capacity_mib < config.cost.unknown_size_mib {
        out.warn(
            "admission.raster_capacity_mib",
            "is below cost.unknown_size_mib; unmeasured rasters will render one at a time",
        );
    }
}

fn validate_cost(config: &PathexConfig, out: &mut ValidationDiagnostics) {
    let cost = &config.cost;
    if cost.bytes_per_pixel == 0 {
        out.error("cost.bytes_per_pixel", "must be >= 1");
    }
    if !cost.scale_per_quality.is_finite() || cost.scale_per_quality <= 0.0 {
        out.error("cost.scale_per_quality", "must be a positive number");
    }
    if cost.unknown_size_mib == 0 {
        out.warn(
            "cost.unknown_size_mib",
            "is 0; rasters of unknown size bypass the weighted gate",
        );
    }
}

fn validate_render(config: &PathexConfig, out: &mut ValidationDiagnostics) {
    let render = &config.render;
    if render.profiles.is_empty() {
        out.error("render.profiles", "must list at least one profile");
    } else if let Err(err) = render.profile_set() {
        out.error("render.default_profile", err.to_string());
    }
    if let Err(err) = render.quality_range() {
        out.error("render.quality_default", err.to_string());
    }
    if render.command.first().map_or(true, |program| program.trim().is_empty()) {
        out.error("render.command", "must name the render engine program");
    }
    if render.timeout_secs == 0 {
        out.error("render.timeout_secs", "must be >= 1");
    }
}

fn validate_logging(config: &PathexConfig, out: &mut ValidationDiagnostics) {
    let normalized = LoggingConfig::normalize_level_directives(&config.logging.level);
    if !config.logging.level.trim().is_empty()
        && tracing_subscriber::EnvFilter::try_new(normalized.clone()).is_err()
    {
        out.warnings.push(ConfigWarning::LoggingLevelInvalid {
            value: config.logging.level.clone(),
            normalized,
        });
    }
}
