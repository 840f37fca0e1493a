//! REST API module using Axum
//!
//! Provides the `/api/v1` surface over the running pipeline: health,
//! predictions, model coefficients, sample ingress, alert levels,
//! recommendation review and the automated-action log. Every response uses
//! the `{data, meta}` / `{error, meta}` envelope.

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;
pub use routes::api_routes;

use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use envelope::ApiErrorResponse;

/// Environment variable listing allowed cross-origin callers.
pub const CORS_ORIGINS_ENV: &str = "FORGEWATCH_CORS_ORIGINS";

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `FORGEWATCH_CORS_ORIGINS` to a comma-separated list of allowed
/// origins (e.g., `http://localhost:5173` for a local dashboard).
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    match std::env::var(CORS_ORIGINS_ENV) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

async fn not_found() -> Response {
    ApiErrorResponse::not_found("No such endpoint")
}

async fn root() -> Response {
    (StatusCode::OK, "forgewatch is running. API under /api/v1").into_response()
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .route("/", axum::routing::get(root))
        .nest("/api/v1", routes::api_routes(state))
        .fallback(not_found)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer())
}
