//! Router assembly: public, protected and admin tiers

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config;
use crate::error::ApiError;
use crate::handlers::{elevated, protected, public};
use crate::middleware::{
    audit_middleware, jwt_auth_middleware, require_admin_middleware, validate_user_middleware,
};

pub fn app() -> Router {
    let limit = config::config().api.max_request_size_bytes;

    Router::new()
        .merge(public_routes())
        .merge(protected_routes())
        .merge(admin_routes())
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(limit))
        .layer(RequestBodyLimitLayer::new(limit))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn public_routes() -> Router {
    use public::auth;

    Router::new()
        .route("/api/health", get(public::health::health))
        .route("/api/auth/register", post(auth::register_post))
        .route("/api/auth/login", post(auth::login_post))
        .route_layer(from_fn(audit_middleware))
}

fn protected_routes() -> Router {
    use protected::{auth, files, reports, users};

    Router::new()
        // Session
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout))
        // Reports
        .route("/api/reports", get(reports::report_list).post(reports::report_post))
        .route(
            "/api/reports/:id",
            get(reports::report_get)
                .put(reports::report_put)
                .delete(reports::report_delete),
        )
        .route("/api/reports/:id/submit", post(reports::submit_post))
        .route("/api/reports/:id/approve", post(reports::approve_post))
        .route("/api/reports/:id/reject", post(reports::reject_post))
        .route("/api/reports/:id/comments", post(reports::comment_post))
        .route("/api/reports/:id/export", get(reports::export_get))
        .route("/api/reports/:id/steps", put(reports::step_put))
        .route("/api/reports/:id/completion", get(reports::completion_get))
        .route("/api/reports/:id/steps/:step/generate", post(reports::signals_generate))
        // Approver lookup
        .route("/api/users/by-role/:role", get(users::by_role))
        // Files
        .route("/api/files/upload", post(files::upload_post))
        .route("/api/files/:id", get(files::download_get).delete(files::file_delete))
        // Innermost first: audit sees the validated user
        .route_layer(from_fn(audit_middleware))
        .route_layer(from_fn(validate_user_middleware))
        .route_layer(from_fn(jwt_auth_middleware))
}

fn admin_routes() -> Router {
    use elevated::{audit, settings, users};

    Router::new()
        .route("/api/users", get(users::user_list).post(users::user_post))
        .route("/api/users/pending/count", get(users::pending_count))
        .route("/api/users/:id", put(users::user_put).delete(users::user_delete))
        .route("/api/users/:id/approve", post(users::user_approve))
        .route("/api/audit", get(audit::audit_list))
        .route("/api/audit/stats", get(audit::audit_stats))
        .route("/api/settings", get(settings::settings_get).put(settings::settings_put))
        .route_layer(from_fn(audit_middleware))
        .route_layer(from_fn(require_admin_middleware))
        .route_layer(from_fn(validate_user_middleware))
        .route_layer(from_fn(jwt_auth_middleware))
}

fn cors_layer() -> CorsLayer {
    let security = &config::config().security;
    if !security.enable_cors {
        return CorsLayer::new();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();

    if origins.is_empty() || security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn unknown_routes_are_404() {
        let (status, body) = send(Request::get("/api/nope").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Route not found");
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        for uri in ["/api/reports", "/api/auth/me", "/api/users", "/api/settings", "/api/users/by-role/TECHNICAL_MANAGER"] {
            let (status, body) = send(Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
            assert_eq!(body["error"]["message"], "Access token required", "{}", uri);
        }
    }

    #[tokio::test]
    async fn garbage_tokens_are_rejected() {
        let request = Request::get("/api/reports")
            .header(header::AUTHORIZATION, "Bearer not.a.jwt")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }
}
