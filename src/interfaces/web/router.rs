use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{drafts, error_logs, platforms, scheduled, scheduling};

fn build_localhost_cors(port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", port),
        format!("http://localhost:{}", port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/tasks",
            get(drafts::list_drafts).post(drafts::create_draft),
        )
        .route("/api/tasks/approved", get(drafts::list_approved))
        .route("/api/tasks/approved/{task_id}", get(drafts::get_approved))
        .route("/tasks/{task_id}/approve", post(drafts::approve_task))
        .route(
            "/tasks/{task_id}",
            put(drafts::update_draft).delete(drafts::delete_draft),
        )
        .route("/tasks/{task_id}/cancel", post(scheduling::cancel_task))
        .route("/schedule-task", post(scheduling::schedule_task))
        .route("/task/post-now", post(scheduling::post_now))
        .route(
            "/task/post-now-scheduled/{task_id}",
            post(scheduling::post_now_scheduled),
        )
        .route("/api/tasks-scheduled", get(scheduled::list_scheduled))
        .route(
            "/view/tasks-scheduled/{task_id}",
            get(scheduled::scheduled_task_detail),
        )
        .route("/error-logs", get(error_logs::list_error_logs))
        .route("/api/active/platforms", get(platforms::active_platforms))
        .route("/api/platforms/list", get(platforms::list_platforms))
        .route("/api/platforms", post(platforms::register_platform))
        .route("/api/platforms/{platform_id}", post(platforms::update_platform))
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'",
        ),
    );
    response
}
