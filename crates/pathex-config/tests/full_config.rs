use pathex_config::{ConfigWarning, PathexConfig};
use std::time::Duration;

const FULL: &str = r#"
release_version = 88

[server]
bind = "0.0.0.0:9000"
max_upload_bytes = "8MiB"
fetch_timeout_secs = 10

[cache]
root = "/srv/pathex/artifacts"
prune_stale_releases = false

[tokens]
root = "/srv/pathex/tokens"
ttl_secs = 86400
high_water_bytes = "1GiB"
low_water_bytes = "768MiB"
sweep_interval_secs = 60

[admission]
raster_capacity_mib = 2048
document_limit = 2
measure_limit = 3
acquire_timeout_ms = 30000

[cost]
bytes_per_pixel = 3
scale_per_quality = 0.25
unknown_size_mib = 128

[render]
profiles = ["Modern", "standard", "high-contrast"]
default_profile = "standard"
quality_min = 1
quality_max = 10
quality_default = 6
command = ["/usr/local/bin/pathex-render", "--headless"]
timeout_secs = 300

[graph]
snapshot = "/srv/pathex/graph.json"

[logging]
level = "pathex.gate=debug,info"
json = true
"#;

#[test]
fn every_table_round_trips_through_validation() {
    let (config, diagnostics) = PathexConfig::load_from_str_with_diagnostics(FULL).unwrap();
    assert!(diagnostics.is_empty(), "{diagnostics:?}");

    assert_eq!(config.server.bind.port(), 9000);
    assert_eq!(config.server.max_upload_bytes.bytes(), 8 * 1024 * 1024);
    assert_eq!(config.server.fetch_timeout(), Duration::from_secs(10));
    assert_eq!(config.admission.measure_limit, 3);
    assert!(!config.cache.prune_stale_releases);
    assert_eq!(config.tokens.ttl(), Duration::from_secs(86_400));
    assert_eq!(config.tokens.sweep_interval(), Duration::from_secs(60));
    assert_eq!(
        config.admission.acquire_timeout(),
        Some(Duration::from_secs(30))
    );
    assert_eq!(config.render.timeout(), Duration::from_secs(300));

    let profiles = config.render.profile_set().unwrap();
    assert_eq!(profiles.default_profile().as_str(), "standard");
    assert_eq!(profiles.names().len(), 3);
    assert_eq!(config.render.quality_range().unwrap().default_quality().get(), 6);
}

#[test]
fn problems_surface_together_with_unknown_keys() {
    let text = FULL
        .replace("document_limit = 2", "document_limit = 0\nqueue_depth = 5")
        .replace("raster_capacity_mib = 2048", "raster_capacity_mib = 64")
        .replace("level = \"pathex.gate=debug,info\"", "level = \"pathex.gate=chatty\"");
    let (_config, diagnostics) = PathexConfig::load_from_str_with_diagnostics(&text).unwrap();

    assert_eq!(diagnostics.unknown_keys, vec!["admission.queue_depth"]);
    assert!(!diagnostics.is_ok());
    assert_eq!(diagnostics.errors.len(), 1);
    assert!(diagnostics.errors[0]
        .to_string()
        .starts_with("admission.document_limit"));
    assert!(diagnostics
        .warnings
        .iter()
        .any(|warning| warning.to_string().starts_with("admission.raster_capacity_mib")));
    assert!(diagnostics
        .warnings
        .iter()
        .any(|warning| matches!(warning, ConfigWarning::LoggingLevelInvalid { .. })));
}
