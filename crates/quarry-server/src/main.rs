mod auth;
mod error;
mod execute;
mod handlers;
mod state;

use handlers::router;
use quarry_audit::{AuditRecorder, PgStorage};
use quarry_core::{QuarryConfig, WritePermissionSet};
use quarry_engine::{SharedCatalog, TableCatalog};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("QUARRY_CONFIG").ok())
        .unwrap_or_else(|| "quarry.yaml".to_string());
    let cfg = QuarryConfig::load(&config_path)?;
    if let Some(project) = &cfg.project {
        tracing::info!(%project, "starting quarry");
    }

    // Lazy pool so a temporarily unreachable database does not prevent
    // startup; the catalog load below reports the degraded state.
    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect_lazy(&cfg.database.url)?;

    let catalog = match TableCatalog::load(&pool).await {
        Ok(catalog) => catalog,
        Err(err) => {
            tracing::warn!(error = %err, "catalog load failed; starting with an empty allow-list");
            TableCatalog::default()
        }
    };
    let catalog = SharedCatalog::new(catalog);

    let permissions = WritePermissionSet::from_entries(&cfg.write_permissions)?;
    tracing::info!(keys = permissions.len(), "write permissions loaded");

    let audit = if cfg.audit.enabled {
        match PgStorage::new(pool.clone(), cfg.audit.table.clone()).await {
            Ok(storage) => AuditRecorder::new(Arc::new(storage)),
            Err(err) => {
                tracing::warn!(error = %err, "audit storage unavailable; audit trail disabled");
                AuditRecorder::disabled()
            }
        }
    } else {
        AuditRecorder::disabled()
    };

    let state = Arc::new(AppState {
        pool,
        catalog,
        permissions,
        audit,
        disclose_errors: cfg.disclose_errors,
    });

    let app = router(state);
    let addr = cfg.http.bind;
    tracing::info!("quarry-server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
