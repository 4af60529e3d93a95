//! tiercache CLI
//!
//! Operates a two-tier cache backed by Redis: one-shot commands for
//! inspecting and editing entries, and a `serve` mode that runs the cache's
//! background tasks and exposes Prometheus metrics and a health endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         tiercache serve                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   /metrics   │◀───│ CacheManager │───▶│    Redis     │       │
//! │  │   /healthz   │    │  L1 + sweep  │    │     (L2)     │       │
//! │  │   (hyper)    │    │  + collector │    │              │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, Registry, TextEncoder};
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiercache::cache::{
    CacheConfig, CacheConfigOverrides, CacheManager, CachePreset, GetOptions, RedisStore,
    SetOptions,
};
use tiercache::monitoring::HealthStatus;

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiercache - two-tier (in-process + Redis) cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Redis URL for the L2 tier
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// YAML file with configuration overrides
    #[arg(long, env = "TIERCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Configuration preset (external-api, session, computed, reference)
    #[arg(long, env = "TIERCACHE_PRESET")]
    preset: Option<CachePreset>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a value
    Get {
        namespace: String,
        key: String,
        /// Expected version; a different stored version is treated as stale
        #[arg(long)]
        version: Option<String>,
    },
    /// Write a JSON value to both tiers
    Set {
        namespace: String,
        key: String,
        /// Value as JSON
        value: String,
        /// TTL in seconds (tier defaults when omitted)
        #[arg(long)]
        ttl: Option<u64>,
        /// Version tag
        #[arg(long)]
        version: Option<String>,
    },
    /// Delete a key from both tiers
    Delete { namespace: String, key: String },
    /// Delete every key of a namespace
    Clear { namespace: String },
    /// Print statistics as JSON
    Stats,
    /// Print the health report; exits non-zero when unhealthy
    Health,
    /// Run background tasks and serve /metrics and /healthz
    Serve {
        /// HTTP bind address
        #[arg(long, env = "TIERCACHE_ADDR", default_value = "0.0.0.0:9090")]
        addr: String,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    let config = resolve_config(&args)?;
    let cache = Arc::new(build_cache(&args, config).await?);

    match args.command {
        Command::Get {
            namespace,
            key,
            version,
        } => {
            let mut options = GetOptions::new();
            if let Some(version) = version {
                options = options.with_version(version);
            }
            match cache.get::<Value>(&namespace, &key, options).await {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("(nil)"),
            }
        }
        Command::Set {
            namespace,
            key,
            value,
            ttl,
            version,
        } => {
            let value: Value = serde_json::from_str(&value).context("value must be valid JSON")?;
            let options = SetOptions {
                ttl,
                version,
            };
            cache.set(&namespace, &key, &value, options).await;
            println!("OK");
        }
        Command::Delete { namespace, key } => {
            let removed = cache.delete(&namespace, &key).await;
            println!("{}", if removed { 1 } else { 0 });
        }
        Command::Clear { namespace } => {
            println!("{}", cache.clear(&namespace).await);
        }
        Command::Stats => {
            let stats = cache.refresh_stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Health => {
            let report = cache.health().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status == HealthStatus::Unhealthy {
                bail!("cache is unhealthy");
            }
        }
        Command::Serve { addr } => {
            serve(cache, &addr).await?;
        }
    }

    Ok(())
}

fn resolve_config(args: &Args) -> anyhow::Result<CacheConfig> {
    let mut overrides = args
        .preset
        .map(|preset| preset.overrides())
        .unwrap_or_default();

    if let Some(path) = &args.config {
        let file = CacheConfigOverrides::from_yaml_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        overrides = overrides.merge(file);
    }

    let config = CacheConfig::resolve(overrides).context("invalid cache configuration")?;
    info!(
        preset = ?args.preset.map(|p| p.name()),
        l1_enabled = config.l1.enabled,
        l1_ttl = config.l1.ttl_seconds,
        l2_enabled = config.l2.enabled,
        l2_ttl = config.l2.ttl_seconds,
        compression = config.l2.compression,
        key_prefix = %config.l2.key_prefix,
        "cache configuration resolved"
    );
    Ok(config)
}

async fn build_cache(args: &Args, config: CacheConfig) -> anyhow::Result<CacheManager> {
    if !config.l2.enabled {
        return Ok(CacheManager::local_only(config)?);
    }

    let store = RedisStore::connect(&args.redis_url)
        .await
        .with_context(|| format!("failed to connect to {}", args.redis_url))?;
    Ok(CacheManager::new(config, Arc::new(store))?)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("redis=warn".parse()?);

    // Logs go to stderr so command output on stdout stays machine-readable
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

// =============================================================================
// HTTP Server
// =============================================================================

async fn serve(cache: Arc<CacheManager>, addr: &str) -> anyhow::Result<()> {
    let registry = Registry::new();
    cache.register_metrics(&registry)?;
    let registry = Arc::new(registry);

    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid server address: {}", addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    cache.start();
    info!("tiercache listening on {}", addr);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            accepted = listener.accept() => {
                let (stream, _) = accepted.context("accept failed")?;
                let io = TokioIo::new(stream);
                let cache = Arc::clone(&cache);
                let registry = Arc::clone(&registry);

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        handle(req, Arc::clone(&cache), Arc::clone(&registry))
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        error!("connection error: {}", e);
                    }
                });
            }
        }
    }

    cache.shutdown().await;
    Ok(())
}

async fn handle(
    req: Request<Incoming>,
    cache: Arc<CacheManager>,
    registry: Arc<Registry>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/metrics" => {
            let mut buffer = Vec::new();
            match TextEncoder::new().encode(&registry.gather(), &mut buffer) {
                Ok(()) => with_content_type(
                    plain(StatusCode::OK, buffer),
                    HeaderValue::from_static(prometheus::TEXT_FORMAT),
                ),
                Err(e) => plain(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            }
        }
        "/healthz" => {
            let report = cache.health().await;
            let status = if report.status == HealthStatus::Unhealthy {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::OK
            };
            match serde_json::to_vec(&report) {
                Ok(body) => with_content_type(
                    plain(status, body),
                    HeaderValue::from_static("application/json"),
                ),
                Err(e) => plain(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            }
        }
        _ => plain(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(response)
}

fn plain(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

fn with_content_type(mut response: Response<Full<Bytes>>, value: HeaderValue) -> Response<Full<Bytes>> {
    response.headers_mut().insert(CONTENT_TYPE, value);
    response
}
