//! VoxBill Server
//!
//! Billing backbone for a prepaid international-calling platform: ingests
//! carrier lifecycle webhooks, reconciles call costs into the ledger, and
//! triggers auto top-ups.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use std::env;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voxbill_api::{build_services, configure_adjustments, configure_ledger, configure_webhooks};
use voxbill_cache::RedisCache;
use voxbill_core::AppConfig;
use voxbill_db::{create_pool, pool::run_migrations};

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "voxbill",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Configure API routes
fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            // Health check
            .route("/health", web::get().to(health_check))
            // Carrier webhook ingestion
            .configure(configure_webhooks)
            // Ledger statements and balances
            .configure(configure_ledger)
            // Admin adjustments
            .configure(configure_adjustments),
    );
}

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "voxbill={},voxbill_api={},voxbill_services={},voxbill_db={},actix_web=info,sqlx=warn",
            log_level, log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing();

    info!("Starting VoxBill v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });

    let pool = create_pool(
        &config.database.url,
        Some(config.database.max_connections),
    )
    .await
    .unwrap_or_else(|e| {
        eprintln!("Failed to connect to database: {}", e);
        std::process::exit(1);
    });

    run_migrations(&pool).await.unwrap_or_else(|e| {
        eprintln!("Failed to run migrations: {}", e);
        std::process::exit(1);
    });

    let cache = RedisCache::new(&config.redis.url).await.unwrap_or_else(|e| {
        eprintln!("Failed to connect to Redis: {}", e);
        std::process::exit(1);
    });

    let services = build_services(pool, cache, &config).unwrap_or_else(|e| {
        eprintln!("Failed to wire services: {}", e);
        std::process::exit(1);
    });
    let services = web::Data::new(services);

    let addr = config.server_addr();
    let workers = config.server.workers;

    info!("Listening on {} with {} workers", addr, workers);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .app_data(services.clone())
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(cors)
            .configure(configure_routes)
    })
    .workers(workers)
    .bind(&addr)?
    .run()
    .await
}
