//! snaplet server binary.

use std::str::FromStr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use snaplet::engine::EngineConfig;
use snaplet::engine::chromium::ChromiumEngine;
use snaplet::transport::{ServerConfig, serve};
use snaplet::{
    DEFAULT_MAX_CONCURRENCY, EnginePool, Health, PoolConfig, RenderService, VersionInfo,
};

/// Initialize tracing with SNAPLET_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("SNAPLET_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("snaplet={base_level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("snaplet {}", env!("CARGO_PKG_VERSION"));

    let server_config = ServerConfig {
        host: env_or("SNAPLET_HOST", "0.0.0.0".to_string()),
        port: env_or("SNAPLET_PORT", 5000),
        await_explicit_shutdown: env_flag("SNAPLET_AWAIT_EXPLICIT_SHUTDOWN"),
    };

    let engine_config = EngineConfig {
        executable: std::env::var("SNAPLET_CHROME").ok().map(Into::into),
        ..EngineConfig::default()
    };

    let pool_config = PoolConfig {
        max_sessions_per_instance: env_or("SNAPLET_MAX_SESSIONS_PER_INSTANCE", 300),
        engine: engine_config,
    };
    let max_concurrency = env_or("SNAPLET_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY);

    let engine = Arc::new(ChromiumEngine::new());
    let pool = Arc::new(EnginePool::new(engine, pool_config));

    let service = Arc::new(
        RenderService::new(pool, max_concurrency)
            .with_version(VersionInfo::new().with_engine("chromium")),
    );

    // The pool launches lazily on the first render, so the service is ready
    // as soon as the listener is up.
    service.set_health(Health::Ready).await;

    serve(server_config, service).await
}
