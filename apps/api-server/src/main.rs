//! # Vigil API Server
//!
//! Actix-web front end for the scan dashboard: rate-limited scan submission
//! and status polling.

use actix_web::{App, HttpServer, web};
use anyhow::Context;
use tracing_actix_web::TracingLogger;

mod background;
mod config;
mod handlers;
mod middleware;
mod state;
mod telemetry;

use config::AppConfig;
use middleware::rate_limit::RateLimitMiddleware;
use state::AppState;
use telemetry::TelemetryConfig;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env();

    tracing::info!(
        "Starting Vigil API Server on {}:{}",
        config.host,
        config.port
    );

    let state = AppState::new(&config)
        .await
        .context("Failed to build application state")?;

    #[cfg(feature = "scheduler")]
    let _scheduler = start_scheduler(&state).await;

    let policy = config.rate_limit;
    tracing::info!(
        max_requests = policy.max_requests,
        window_secs = policy.window_secs,
        "Rate limit policy"
    );

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .service(
                handlers::api_scope()
                    .wrap(RateLimitMiddleware::new(state.limiter.clone(), policy)),
            )
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("Failed to bind to {}:{}", config.host, config.port))?
    .run()
    .await
    .context("Server error")?;

    Ok(())
}

#[cfg(feature = "scheduler")]
async fn start_scheduler(state: &AppState) -> Option<background::scheduler::Scheduler> {
    use background::scheduler::{Scheduler, SchedulerConfig};

    let scheduler = match Scheduler::new(SchedulerConfig::from_env()).await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create scheduler");
            return None;
        }
    };

    if let Err(e) = scheduler
        .add_rate_limit_sweep(state.limiter.fallback().clone())
        .await
    {
        tracing::error!(error = %e, "Failed to register rate limit sweep");
        return None;
    }

    if let Err(e) = scheduler.start().await {
        tracing::error!(error = %e, "Failed to start scheduler");
        return None;
    }

    Some(scheduler)
}
