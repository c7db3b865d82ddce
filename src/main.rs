// src/main.rs
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use anyhow::Context;
use insectiscan::AnalysisService;
use insectiscan::analytics::LogAnalytics;
use insectiscan::clock::SystemClock;
use insectiscan::config::Config;
use insectiscan::context::ConnectivityFlag;
use insectiscan::services::{OpenAiEndpoint, PromptBuilder};
use log::{info, warn};
use std::sync::Arc;

mod handlers;

use crate::handlers::{analyze, clear_cache, stats};

#[derive(Clone)]
pub struct AppState {
    analysis: Arc<AnalysisService>,
    analytics: Arc<LogAnalytics>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting insectiscan service...");

    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize services
    let endpoint = Arc::new(
        OpenAiEndpoint::new(
            config.api_key.clone(),
            config.endpoint.clone(),
            config.request_timeout,
        )
        .context("Failed to build model endpoint client")?,
    );
    let analytics = Arc::new(LogAnalytics::new());
    let connectivity = Arc::new(ConnectivityFlag::new(!config.force_offline));
    if config.force_offline {
        warn!("Offline mode forced, every scan uses the local classifier");
    }

    let analysis = AnalysisService::new(
        endpoint,
        connectivity,
        analytics.clone(),
        Arc::new(SystemClock),
    )
    .with_prompt_builder(PromptBuilder::new(config.model.clone(), config.max_tokens))
    .with_cache_ttl(config.cache_ttl);

    let app_state = AppState {
        analysis: Arc::new(analysis),
        analytics,
    };

    info!(
        "Starting HTTP server on {} (model {})",
        config.bind_addr, config.model
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .service(
                web::scope("/api/v1")
                    .route("/analyze/{kind}", web::post().to(analyze))
                    .route("/cache", web::delete().to(clear_cache))
                    .route("/stats", web::get().to(stats)),
            )
            .route("/health", web::get().to(health_check))
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("Failed to bind {}", config.bind_addr))?
    .run()
    .await?;

    Ok(())
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "insectiscan",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
