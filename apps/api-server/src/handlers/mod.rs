//! HTTP handlers and route configuration.

mod health;
mod scans;

use actix_web::web;

/// The `/api` scope with all routes registered.
///
/// The caller decides which middleware wraps the scope.
pub fn api_scope() -> actix_web::Scope {
    web::scope("/api")
        .route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/scans")
                .route("", web::post().to(scans::submit_scan))
                .route("/{job_id}", web::get().to(scans::scan_status)),
        )
}
