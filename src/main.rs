//! Lineage Impact API - Data Lineage and Impact Analysis Service
//!
//! Builds lineage graphs from facts recorded by per-engine collectors and
//! answers "what breaks if this changes?" questions.
//!
//! - Lineage graphs: complete, per resource, per workflow
//! - Graph queries: filtering and path finding
//! - Impact analysis: downstream, upstream, full and schema change
//! - Impact history: stored analyses that can be listed and reopened

mod config;
mod error;
mod impact;
mod lineage;
mod models;
mod routes;
mod state;

use crate::config::{DatabaseConfig, Settings};
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting Lineage Impact API...");

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "📋 Configuration loaded (engines: {}, max depth: {}, query timeout: {:?})",
        settings.lineage.engines.join(", "),
        settings.lineage.max_depth,
        settings.lineage.query_timeout
    );

    // The lineage store is required
    let pool = init_database_pool(&settings.database).await?;
    info!("✅ Database pool created successfully");

    let state = Arc::new(AppState::new(pool, settings.lineage.clone()));

    // History table is optional; analyses still run without it
    if let Err(e) = state.history.initialize_tables().await {
        warn!("⚠️  Could not initialize impact history tables: {}", e);
    }

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Lineage ───");
    info!("   GET    /api/lineage/graph          - Complete lineage graph");
    info!("   GET    /api/lineage/resource       - Lineage around a table or column");
    info!("   GET    /api/lineage/workflows      - Workflow and task graph");
    info!("   POST   /api/lineage/filter         - Filter the complete graph");
    info!("   GET    /api/lineage/path           - Shortest path between nodes");
    info!("");
    info!("   ─── Impact Analysis ───");
    info!("   POST   /api/impact/downstream      - What is affected by a change");
    info!("   POST   /api/impact/upstream        - What a resource depends on");
    info!("   POST   /api/impact/full            - Both directions");
    info!("   POST   /api/impact/schema-change   - Impact of a planned schema change");
    info!("   POST   /api/impact/report          - Report document, optionally stored");
    info!("   GET    /api/impact/history         - Stored analyses of a resource");
    info!("   GET    /api/impact/history/{{id}}    - One stored analysis");
    info!("   DELETE /api/impact/history         - Remove old analyses");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lineage_impact_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Create the lineage store pool and check that it answers
async fn init_database_pool(database: &DatabaseConfig) -> anyhow::Result<deadpool_postgres::Pool> {
    use deadpool_postgres::{Config, ManagerConfig, PoolConfig, RecyclingMethod, Runtime};

    let mut cfg = Config::new();
    cfg.host = Some(database.host.clone());
    cfg.port = Some(database.port);
    cfg.user = Some(database.user.clone());
    cfg.password = Some(database.password.clone());
    cfg.dbname = Some(database.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(database.max_pool_size));

    // Create pool with TLS support if needed
    let pool = if database.require_tls {
        let certs = rustls_native_certs::load_native_certs();
        for e in &certs.errors {
            warn!("⚠️  Skipping unreadable native certificate: {}", e);
        }
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

        cfg.create_pool(Some(Runtime::Tokio1), tls)
            .map_err(|e| anyhow::anyhow!("Failed to create TLS pool: {}", e))?
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
            .map_err(|e| anyhow::anyhow!("Failed to create pool: {}", e))?
    };

    // Test the connection
    let client = pool
        .get()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get pool connection: {}", e))?;

    client
        .query_one("SELECT 1 as ok", &[])
        .await
        .map_err(|e| anyhow::anyhow!("Failed to verify database connection: {}", e))?;

    info!(
        "✅ Database connection successful ({}:{}/{}, TLS: {})",
        database.host, database.port, database.database, database.require_tls
    );
    Ok(pool)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
