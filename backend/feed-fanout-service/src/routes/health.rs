use crate::error::FeedError;
use crate::state::AppState;
use actix_web::{get, web, HttpResponse};

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "instance_id": state.gateway.instance_id(),
    }))
}

#[get("/metrics")]
pub async fn prometheus_metrics() -> Result<HttpResponse, FeedError> {
    let body = crate::metrics::render().map_err(|e| FeedError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}
