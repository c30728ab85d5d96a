// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bot detection gate service
//!
//! Serves a landing page behind the gate, the link token probe endpoint and
//! an external authorization endpoint for reverse proxies.
//!
//! ## Configuration
//!
//! Loaded from a TOML file, overridden by environment variables:
//!
//! - `BOTGATE_CONFIG`: config file path (default: botgate.toml, optional)
//! - `BOTGATE__<SECTION>__<KEY>`: any config key, e.g. `BOTGATE__REDIS__URL`
//! - `RUST_LOG`: log filter (default: info)

use anyhow::Context;
use axum::Router;
use rand::rngs::OsRng;
use rand::RngCore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use botgate::{
    config::Config,
    handlers::{router, AppState},
    identity::IdentityResolver,
    metrics::GateMetrics,
    store::{KvStore, MemoryStore, RedisStore},
    RequestGate,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let mut config = load_config()?;
    config.validate()?;
    if config.redis.secret.is_empty() {
        // Only reached without a shared store
        warn!("redis.secret is empty, using a random per-process secret");
        config.redis.secret = random_secret();
    }
    info!(
        bind_addr = %config.bind_addr,
        link_token = config.ip_limit.link_token,
        filter_link_local = config.ip_limit.filter_link_local,
        routes = config.routes.len(),
        "Starting bot detection gate"
    );

    let store = open_store(&config).await;
    let gate = RequestGate::from_config(&config, store);

    let state = Arc::new(AppState {
        gate,
        resolver: IdentityResolver::new(config.network.clone()),
        metrics: GateMetrics::new()?,
        config: config.clone(),
    });

    let app: Router = router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Load configuration from the optional file and the environment.
fn load_config() -> anyhow::Result<Config> {
    let path = std::env::var("BOTGATE_CONFIG").unwrap_or_else(|_| "botgate.toml".to_string());
    let settings = ::config::Config::builder()
        .add_source(::config::File::new(&path, ::config::FileFormat::Toml).required(false))
        .add_source(::config::Environment::with_prefix("BOTGATE").separator("__"))
        .build()
        .with_context(|| format!("reading configuration from {path}"))?;
    settings
        .try_deserialize()
        .context("invalid configuration")
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Redis when configured, else the in-process store when allowed.
async fn open_store(config: &Config) -> Option<Arc<dyn KvStore>> {
    if let Some(url) = &config.redis.url {
        match RedisStore::connect(url, config.redis.timeout()).await {
            Ok(store) => return Some(Arc::new(store)),
            Err(err) => error!(error = %err, "Redis connection failed"),
        }
    }
    if !config.redis.memory_fallback {
        return None;
    }

    warn!("Using in-process store, counters are not shared between instances");
    let store = Arc::new(MemoryStore::default());
    let cleanup = store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup.purge_expired().await;
        }
    });
    Some(store)
}
