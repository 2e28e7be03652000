use super::handlers::{comments, seed, sse};
use crate::config::Settings;
use crate::state::AppState;
use axum::{
    http::{HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

const METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PATCH, Method::DELETE];

fn cors_layer(allowed_origins: &str, user_header: &str) -> CorsLayer {
    let any = || {
        CorsLayer::new()
            .allow_methods(METHODS)
            .allow_origin(Any)
            .allow_headers(Any)
    };
    if allowed_origins == "*" {
        return any();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS config is invalid or empty, falling back to allow ANY.");
        return any();
    }

    tracing::info!("CORS enabled for origins: {:?}", origins);
    let mut headers = vec![axum::http::header::CONTENT_TYPE];
    if let Ok(h) = user_header.parse::<HeaderName>() {
        headers.push(h);
    }
    CorsLayer::new()
        .allow_methods(METHODS)
        .allow_origin(origins)
        .allow_headers(headers)
}

// 超时只限制响应头的返回，SSE 的长连接不受影响
fn with_layers(router: Router<AppState>, settings: &Settings) -> Router<AppState> {
    let cors = cors_layer(&settings.server.cors_origins, &settings.server.user_header);
    router
        .layer(TimeoutLayer::new(settings.comments.request_timeout()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/api/fines/:fine_id/comments", get(comments::list_comments))
        .route(
            "/api/fines/:fine_id/comments/threaded",
            get(comments::threaded_comments),
        )
        .route(
            "/api/fines/:fine_id/comments/count",
            get(comments::count_comments),
        )
        .route("/api/fines/:fine_id/comments/sse", get(sse::sse_handler))
        .route("/api/comments/recent", get(comments::recent_comments))
        .route("/api/comments", post(comments::post_comment))
        .route(
            "/api/comments/:comment_id",
            get(comments::get_comment)
                .patch(comments::edit_comment)
                .delete(comments::delete_comment),
        )
        .route("/api/users", post(seed::upsert_user))
        .route("/api/fines", post(seed::create_fine));

    let settings = state.settings.clone();
    with_layers(routes, &settings).with_state(state)
}
