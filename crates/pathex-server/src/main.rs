use anyhow::{bail, Context};
use clap::Parser;
use pathex_cache::{prune_stale_releases, spawn_sweeper, ArtifactCache, TokenStore, TokenStorePolicy};
use pathex_config::{PathexConfig, CONFIG_ENV_VAR};
use pathex_core::{GraphLayer, SnapshotGraph};
use pathex_gate::CancellationToken;
use pathex_server::{AppState, CommandRenderEngine, ExportSettings, Exporter, InteractorService};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Diagram and document export service.
#[derive(Debug, Parser)]
#[command(name = "pathex", version, about)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = CONFIG_ENV_VAR)]
    config: PathBuf,

    /// Overrides `server.bind`.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, diagnostics) = PathexConfig::load_from_path_with_diagnostics(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    pathex_config::init_tracing(&config.logging);
    for key in &diagnostics.unknown_keys {
        tracing::warn!(target: "pathex.config", key = %key, "unknown config key");
    }
    for warning in &diagnostics.warnings {
        tracing::warn!(target: "pathex.config", "{warning}");
    }
    if !diagnostics.is_ok() {
        for err in &diagnostics.errors {
            tracing::error!(target: "pathex.config", "{err}");
        }
        bail!(
            "{} has {} invalid setting(s)",
            cli.config.display(),
            diagnostics.errors.len()
        );
    }

    run(config).await
}

async fn run(config: PathexConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    if config.cache.prune_stale_releases {
        let root = config.cache.root.clone();
        let release = config.release_version;
        // The pruner logs what it removed and what it could not.
        tokio::task::spawn_blocking(move || prune_stale_releases(&root, release))
            .await
            .context("release pruning task failed")?
            .context("failed to prune stale releases")?;
    }

    let cache = ArtifactCache::open(&config.cache.root, config.release_version)
        .with_context(|| format!("failed to open artifact cache {}", config.cache.root.display()))?;
    let tokens = Arc::new(
        TokenStore::open(
            &config.tokens.root,
            TokenStorePolicy {
                ttl: config.tokens.ttl(),
                high_water_bytes: config.tokens.high_water_bytes.bytes(),
                low_water_bytes: config.tokens.low_water_bytes.bytes(),
            },
        )
        .with_context(|| format!("failed to open token store {}", config.tokens.root.display()))?,
    );
    let sweeper = spawn_sweeper(tokens.clone(), config.tokens.sweep_interval(), shutdown.clone());

    let graph: Arc<dyn GraphLayer> = match &config.graph.snapshot {
        Some(path) => Arc::new(
            SnapshotGraph::load(path)
                .with_context(|| format!("failed to load graph snapshot {}", path.display()))?,
        ),
        None => {
            tracing::warn!(
                target: "pathex.config",
                "graph.snapshot is not set; every entity will be reported as unknown"
            );
            Arc::new(SnapshotGraph::new())
        }
    };
    let engine = Arc::new(
        CommandRenderEngine::new(&config.render.command, config.render.timeout())
            .context("invalid render.command")?,
    );

    let exporter = Arc::new(Exporter::new(
        graph,
        engine,
        cache,
        ExportSettings::from_config(&config).context("invalid render settings")?,
    ));
    let state = Arc::new(AppState {
        exporter: exporter.clone(),
        interactors: InteractorService::new(tokens, config.server.max_upload_bytes.bytes())
            .with_fetch_timeout(config.server.fetch_timeout()),
        shutdown: shutdown.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!(
        target: "pathex.http",
        addr = %config.server.bind,
        release = config.release_version,
        "listening"
    );

    let signal = shutdown.clone();
    axum::serve(listener, pathex_server::router(state))
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(target: "pathex.http", error = %err, "failed to listen for ctrl-c");
            }
            tracing::info!(target: "pathex.http", "shutting down");
            signal.cancel();
        })
        .await
        .context("server error")?;

    shutdown.cancel();
    exporter.close();
    if let Err(err) = sweeper.await {
        tracing::warn!(target: "pathex.tokens", error = %err, "token sweeper exited abnormally");
    }
    Ok(())
}
