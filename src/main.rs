//! WSI Gateway - Whole Slide Image viewing and inference orchestration.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_gateway::{
    config::{Cli, Command, ServeConfig, TokenConfig},
    create_s3_client,
    job::{HttpComputeClient, JobTracker, PredictionService, SharedSecret},
    resource::ResourceMaterializer,
    server::{create_router, AppState, Authenticator, RouterConfig, TokenAuth},
    slide::{PyramidCache, RasterDecoder},
    store::MemoryStore,
    tile::{JpegTileEncoder, TileRenderer, TileService},
    S3ObjectStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Token(config) => run_token(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("WSI Gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  S3 bucket: {}", config.s3_bucket);
    if let Some(ref endpoint) = config.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    info!("  S3 region: {}", config.s3_region);
    info!(
        "  Local storage: slides in {}, predictions in {}",
        config.slide_dir.display(),
        config.prediction_dir.display()
    );
    info!("  Compute service: {}", config.compute_url);
    info!(
        "  Metadata cache: {} slides, {}s TTL",
        config.metadata_capacity, config.metadata_ttl
    );

    if config.auth_enabled {
        info!("  Auth: enabled");
    } else {
        warn!("  Auth: DISABLED - callers are trusted from the X-User-Id header");
        warn!("        Enable for production: --auth-enabled=true --auth-secret=<secret>");
    }
    if config.compute_api_key.is_empty() {
        warn!("  Compute API key not set - every webhook will be rejected");
    }

    // Storage
    let s3_client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;
    let store = Arc::new(S3ObjectStore::new(s3_client));
    let materializer = Arc::new(ResourceMaterializer::new(store, config.storage_layout()));

    // Slide metadata and tiles
    let cache = Arc::new(PyramidCache::with_settings(
        Arc::new(RasterDecoder::new()),
        config.metadata_capacity,
        config.metadata_ttl(),
    ));
    let _sweeper = cache.spawn_sweeper(config.sweep_interval());

    let renderer = TileRenderer::new(
        config.tile_size,
        Arc::new(JpegTileEncoder::with_quality(config.jpeg_quality)),
    );

    // Records
    let records = match &config.slide_catalog {
        Some(path) => match MemoryStore::load_catalog(path).await {
            Ok(records) => {
                info!("  Slide catalog: {}", path.display());
                Arc::new(records)
            }
            Err(e) => {
                error!("Failed to load slide catalog {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            warn!("  No slide catalog configured - starting with no slides");
            Arc::new(MemoryStore::new())
        }
    };

    let tiles = Arc::new(TileService::new(
        records.clone(),
        materializer.clone(),
        cache,
        renderer,
    ));

    // Inference
    let compute = Arc::new(
        HttpComputeClient::new(&config.compute_url, &config.compute_api_key)
            .with_timeouts(config.start_timeout(), config.cancel_timeout()),
    );
    let tracker = Arc::new(JobTracker::new(
        records.clone(),
        records.clone(),
        compute,
        SharedSecret::new(&config.compute_api_key),
    ));
    let predictions = Arc::new(PredictionService::new(
        records,
        materializer,
        tiles.clone(),
    ));

    let state =
        AppState::new(tiles, tracker, predictions).with_cache_max_age(config.cache_max_age);
    let router = create_router(state, build_router_config(&config));

    // Bind and serve
    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("    curl http://{}/health", addr);
    info!("");

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_gateway=debug,tower_http=debug"
    } else {
        "wsi_gateway=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let authenticator = if config.auth_enabled {
        Authenticator::tokens(TokenAuth::new(config.auth_secret_or_empty()))
    } else {
        Authenticator::trusted()
    };

    let mut router_config = RouterConfig::new(authenticator);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Token Command
// =============================================================================

fn run_token(config: TokenConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let auth = TokenAuth::new(&config.secret);
    let token = auth.issue(config.user_id, Duration::from_secs(config.ttl));

    println!("{}", token);
    ExitCode::SUCCESS
}
