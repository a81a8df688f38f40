//! Configuration management for the gateway.
//!
//! Configuration comes from command-line arguments parsed with clap, each
//! with an environment variable override using the `WSI_` prefix.
//!
//! # Subcommands
//!
//! - `serve` - Run the HTTP server
//! - `token` - Issue a session token for a user
//!
//! # Environment Variables
//!
//! - `WSI_HOST` - Server bind address (default: 0.0.0.0)
//! - `WSI_PORT` - Server port (default: 3000)
//! - `WSI_S3_BUCKET` - S3 bucket name (required)
//! - `WSI_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `WSI_S3_REGION` - AWS region (default: us-east-1)
//! - `WSI_SLIDE_PREFIX` / `WSI_RESULTS_PREFIX` - Key prefixes in the bucket
//! - `WSI_SLIDE_DIR` / `WSI_PREDICTION_DIR` - Local storage roots
//! - `WSI_TILE_SIZE` - Tile edge in pixels (default: 512)
//! - `WSI_JPEG_QUALITY` - JPEG quality (default: 90)
//! - `WSI_METADATA_TTL` - Seconds a slide handle stays cached (default: 300)
//! - `WSI_METADATA_CAPACITY` - Slide handles kept in memory (default: 50)
//! - `WSI_SWEEP_INTERVAL` - Seconds between expiry sweeps (default: 60)
//! - `WSI_COMPUTE_URL` - Base URL of the compute service (required)
//! - `WSI_COMPUTE_API_KEY` - Secret shared with the compute service
//! - `WSI_AUTH_ENABLED` / `WSI_AUTH_SECRET` - Session token authentication
//! - `WSI_SLIDE_CATALOG` - JSON file of slide records to load at startup
//! - `WSI_CORS_ORIGINS` - Allowed CORS origins (comma-separated)
//! - `WSI_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::job::{DEFAULT_CANCEL_TIMEOUT, DEFAULT_START_TIMEOUT};
use crate::resource::{StorageLayout, DEFAULT_RESULTS_PREFIX, DEFAULT_SLIDE_PREFIX};
use crate::slide::{DEFAULT_METADATA_CAPACITY, DEFAULT_METADATA_TTL};
use crate::store::UserId;
use crate::tile::{DEFAULT_JPEG_QUALITY, DEFAULT_TILE_SIZE};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default local directory for slides.
pub const DEFAULT_SLIDE_DIR: &str = "data/slides";

/// Default local directory for prediction results.
pub const DEFAULT_PREDICTION_DIR: &str = "data/predictions";

/// Default seconds between metadata cache sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Default session token lifetime in seconds (12 hours).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 12 * 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Gateway - Whole Slide Image viewing and inference orchestration.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-gateway")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(ServeConfig),

    /// Issue a session token for a user.
    Token(TokenConfig),
}

/// Configuration for the `serve` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "WSI_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "WSI_PORT")]
    pub port: u16,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// S3 bucket holding slides and prediction results.
    #[arg(long, env = "WSI_S3_BUCKET")]
    pub s3_bucket: String,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "WSI_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "WSI_S3_REGION")]
    pub s3_region: String,

    /// Key prefix of slide objects.
    #[arg(long, default_value = DEFAULT_SLIDE_PREFIX, env = "WSI_SLIDE_PREFIX")]
    pub slide_prefix: String,

    /// Key prefix of prediction results.
    #[arg(long, default_value = DEFAULT_RESULTS_PREFIX, env = "WSI_RESULTS_PREFIX")]
    pub results_prefix: String,

    /// Local directory where slides are materialized.
    #[arg(long, default_value = DEFAULT_SLIDE_DIR, env = "WSI_SLIDE_DIR")]
    pub slide_dir: PathBuf,

    /// Local directory where prediction results are materialized.
    #[arg(long, default_value = DEFAULT_PREDICTION_DIR, env = "WSI_PREDICTION_DIR")]
    pub prediction_dir: PathBuf,

    /// JSON file with the slide catalog, loaded at startup.
    #[arg(long, env = "WSI_SLIDE_CATALOG")]
    pub slide_catalog: Option<PathBuf>,

    // =========================================================================
    // Tile Configuration
    // =========================================================================
    /// Tile edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "WSI_TILE_SIZE")]
    pub tile_size: u32,

    /// JPEG quality for tile encoding (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Seconds a decoded slide handle stays cached.
    #[arg(long, default_value_t = DEFAULT_METADATA_TTL.as_secs(), env = "WSI_METADATA_TTL")]
    pub metadata_ttl: u64,

    /// Maximum number of slide handles kept in memory.
    #[arg(long, default_value_t = DEFAULT_METADATA_CAPACITY, env = "WSI_METADATA_CAPACITY")]
    pub metadata_capacity: usize,

    /// Seconds between sweeps of expired slide handles.
    #[arg(long, default_value_t = DEFAULT_SWEEP_INTERVAL_SECS, env = "WSI_SWEEP_INTERVAL")]
    pub sweep_interval: u64,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "WSI_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // Compute Service Configuration
    // =========================================================================
    /// Base URL of the compute service.
    #[arg(long, env = "WSI_COMPUTE_URL")]
    pub compute_url: String,

    /// Secret shared with the compute service, sent as `X-API-Key` and
    /// required on webhooks.
    #[arg(long, env = "WSI_COMPUTE_API_KEY", default_value = "")]
    pub compute_api_key: String,

    /// Seconds to wait for the compute service to accept a job.
    #[arg(long, default_value_t = DEFAULT_START_TIMEOUT.as_secs(), env = "WSI_START_TIMEOUT")]
    pub start_timeout: u64,

    /// Seconds to wait for the compute service to cancel a job.
    #[arg(long, default_value_t = DEFAULT_CANCEL_TIMEOUT.as_secs(), env = "WSI_CANCEL_TIMEOUT")]
    pub cancel_timeout: u64,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// Require signed session tokens.
    ///
    /// When disabled, the caller is taken from the `X-User-Id` header.
    /// WARNING: Only disable authentication in development/testing.
    #[arg(long, default_value_t = true, env = "WSI_AUTH_ENABLED", action = clap::ArgAction::Set)]
    pub auth_enabled: bool,

    /// Secret key for HMAC-SHA256 session tokens.
    #[arg(long, env = "WSI_AUTH_SECRET")]
    pub auth_secret: Option<String>,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "WSI_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.auth_enabled && self.auth_secret.as_deref().map_or(true, str::is_empty) {
            return Err(
                "Authentication is enabled but no secret provided. \
                 Set --auth-secret or WSI_AUTH_SECRET, or disable auth with --auth-enabled=false"
                    .to_string(),
            );
        }

        if self.s3_bucket.is_empty() {
            return Err("S3 bucket name is required. Set --s3-bucket or WSI_S3_BUCKET".to_string());
        }

        if self.compute_url.is_empty() {
            return Err(
                "Compute service URL is required. Set --compute-url or WSI_COMPUTE_URL".to_string(),
            );
        }
        if !self.compute_url.starts_with("http://") && !self.compute_url.starts_with("https://") {
            return Err("compute_url must start with http:// or https://".to_string());
        }

        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if self.metadata_capacity == 0 {
            return Err("metadata_capacity must be greater than 0".to_string());
        }
        if self.metadata_ttl == 0 {
            return Err("metadata_ttl must be greater than 0".to_string());
        }
        if self.sweep_interval == 0 {
            return Err("sweep_interval must be greater than 0".to_string());
        }

        if self.start_timeout == 0 || self.cancel_timeout == 0 {
            return Err("compute timeouts must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Remote and local locations of slides and results.
    pub fn storage_layout(&self) -> StorageLayout {
        StorageLayout::new(&self.s3_bucket, &self.slide_dir, &self.prediction_dir)
            .with_prefixes(&self.slide_prefix, &self.results_prefix)
    }

    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_secs(self.cancel_timeout)
    }

    /// Get the auth secret, or an empty string (call validate() first).
    pub fn auth_secret_or_empty(&self) -> &str {
        self.auth_secret.as_deref().unwrap_or("")
    }
}

/// Configuration for the `token` subcommand.
#[derive(Args, Debug, Clone)]
pub struct TokenConfig {
    /// Secret key for HMAC-SHA256 session tokens.
    #[arg(long, env = "WSI_AUTH_SECRET")]
    pub secret: String,

    /// User the token identifies.
    #[arg(long)]
    pub user_id: UserId,

    /// Token lifetime in seconds.
    #[arg(long, default_value_t = DEFAULT_TOKEN_TTL_SECS)]
    pub ttl: u64,
}

impl TokenConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.is_empty() {
            return Err("Secret is required. Set --secret or WSI_AUTH_SECRET".to_string());
        }
        if self.ttl == 0 {
            return Err("ttl must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
