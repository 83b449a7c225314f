//! # tamsys-api — Axum API Service for TAMSys
//!
//! HTTP surface over the TAMSys registry: catalog and rule matrix
//! administration, tenants, devices with bulk gap initialization,
//! compliance records and their documents, tasks, and the daily expiry
//! job.
//!
//! ## API Surface
//!
//! | Prefix                      | Module                   | Domain                       |
//! |-----------------------------|--------------------------|------------------------------|
//! | `/v1/technologies/*` etc.   | [`routes::catalog`]      | Global catalog               |
//! | `/v1/rules/*`               | [`routes::rules`]        | Rule matrix                  |
//! | `/v1/tenants/*`             | [`routes::tenants`]      | Tenants, notification rules  |
//! | `/v1/devices/*`             | [`routes::devices`]      | Devices, bulk initialization |
//! | `/v1/compliance/*`          | [`routes::compliance`]   | Gap analysis, records, docs  |
//! | `/v1/compliance/tasks/*`    | [`routes::tasks`]        | Tasks and notes              |
//! | `/v1/admin/*`               | [`routes::admin`]        | On-demand expiry run         |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → Handler
//! ```
//!
//! Tenant-scoped routes take `tenant_id` as a query parameter; requests are
//! not authenticated.
//!
//! ## OpenAPI
//!
//! Generated via utoipa derive macros, served at `/openapi.json`.

pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod scheduler;
pub mod state;

use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) and `/metrics` sit outside the request
/// metrics middleware so scrapes and probes do not count as traffic.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::catalog::router())
        .merge(routes::rules::router())
        .merge(routes::tenants::router())
        .merge(routes::devices::router())
        .merge(routes::compliance::router())
        .merge(routes::tasks::router())
        .merge(routes::admin::router())
        .merge(openapi::router())
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let ops = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(middleware::metrics::render))
        .with_state(state);

    Router::new().merge(ops).merge(api)
}

/// Liveness probe: 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 when the application is ready to serve.
async fn readiness() -> &'static str {
    "ready"
}
