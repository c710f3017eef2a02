//! Catalog Ingestion Service - upstream acquisition, caching and episode sync
//!
//! Port: 8085

use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};
use vod_catalog_core::{
    init_logging, load_dotenv, ConfigLoader, DatabaseConfig, DatabasePool, LogConfig,
    RedisConfig, ServiceConfig, ShutdownCoordinator,
};
use vod_catalog_ingestion::{
    CacheTier, CatalogComponents, CatalogService, CatalogStore, HttpProbe, InMemoryCatalogStore,
    IngestionConfig, IngestionError, MemoryCacheTier, PostgresCacheTier, PostgresCatalogStore,
    RedisCacheTier, ResponseNormalizer, TieredCache, TtlPolicy, UpstreamClient,
};

struct AppState {
    catalog: Arc<CatalogService>,
    database: Option<DatabasePool>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let service = ServiceConfig::from_env()?;
    service.validate()?;
    init_logging(&LogConfig {
        level: service.log_level.clone(),
        format: service.log_format,
    })?;

    // Missing upstream settings are fatal before anything else starts
    let config = load_ingestion_config()?;

    info!(
        upstream = %config.upstream.base_url,
        port = service.port,
        "Starting Catalog Ingestion Service"
    );

    let database = connect_database().await?;

    let mut tiers: Vec<Arc<dyn CacheTier>> = vec![Arc::new(MemoryCacheTier::new(
        config.cache.memory_capacity,
        config.cache.memory_ttl,
    ))];

    if let Some(redis_config) = RedisConfig::from_env_if_present()? {
        redis_config.validate()?;
        match RedisCacheTier::connect(&redis_config).await {
            Ok(tier) => tiers.push(Arc::new(tier)),
            Err(e) => warn!(error = %e, "Redis unavailable, running without distributed cache"),
        }
    }

    let store: Arc<dyn CatalogStore> = match &database {
        Some(db) => {
            tiers.push(Arc::new(PostgresCacheTier::new(db.pool().clone())));
            Arc::new(PostgresCatalogStore::new(db.pool().clone()))
        }
        None => {
            warn!("No database available, catalog is kept in memory only");
            Arc::new(InMemoryCatalogStore::new())
        }
    };

    let cache = TieredCache::new(tiers, TtlPolicy::from(&config.cache));
    info!(tiers = ?cache.levels(), "Tiered cache ready");

    let catalog = Arc::new(CatalogService::new(
        &config,
        CatalogComponents {
            upstream: UpstreamClient::new(&config.upstream)?,
            normalizer: ResponseNormalizer::new(config.upstream.image_base.clone()),
            cache,
            store,
            probe: Arc::new(HttpProbe::new(config.analyzer.probe_timeout)?),
        },
    ));

    let coordinator = ShutdownCoordinator::default();
    let sync_handle = coordinator.register_task("episode-sync");
    let sync_task = actix_web::rt::spawn(catalog.orchestrator().run(sync_handle));

    let state = web::Data::new(AppState {
        catalog: Arc::clone(&catalog),
        database,
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
            .wrap(Logger::default())
    })
    .bind((service.host.as_str(), service.port))?
    .disable_signals()
    .run();

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    coordinator.wait_for_signal().await;

    server_handle.stop(true).await;
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "HTTP server stopped with an error"),
        Err(e) => warn!(error = %e, "HTTP server task ended abnormally"),
    }
    if let Err(e) = sync_task.await {
        warn!(error = %e, "Sync task ended abnormally");
    }

    info!("Catalog Ingestion Service stopped");
    Ok(())
}

fn load_ingestion_config() -> Result<IngestionConfig, IngestionError> {
    let config = IngestionConfig::from_env()?;
    config.validate()?;
    Ok(config)
}

/// Pool plus migrations, or `None` when no database is configured or reachable
async fn connect_database() -> anyhow::Result<Option<DatabasePool>> {
    let Some(db_config) = DatabaseConfig::from_env_if_present()? else {
        return Ok(None);
    };
    db_config.validate()?;

    let pool = match DatabasePool::new(&db_config).await {
        Ok(pool) => pool,
        Err(e) => {
            warn!(error = %e, "Database unreachable, continuing without durable storage");
            return Ok(None);
        }
    };

    sqlx::migrate!("../../migrations")
        .run(pool.pool())
        .await
        .context("Failed to run database migrations")?;

    Ok(Some(pool))
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let database = match &state.database {
        Some(db) => {
            let status = if db.is_healthy().await { "up" } else { "down" };
            serde_json::json!({ "status": status, "pool": db.stats() })
        }
        None => serde_json::json!({ "status": "disabled" }),
    };

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "catalog-ingestion",
        "version": env!("CARGO_PKG_VERSION"),
        "sync_phase": state.catalog.orchestrator().phase(),
        "upstream_permits": state.catalog.upstream().available_permits(),
        "cache_tiers": state.catalog.cache().levels(),
        "cache": state.catalog.cache().stats(),
        "database": database,
    }))
}
