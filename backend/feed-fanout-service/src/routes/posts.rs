use super::caller_id;
use crate::error::Result;
use crate::state::AppState;
use actix_web::{post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub text: String,
}

/// Persist the post, then queue its fan-out. The response does not wait for fan-out.
#[post("/posts")]
pub async fn create_post(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreatePostRequest>,
) -> Result<HttpResponse> {
    let author_id = caller_id(&req)?;
    let post_id = state.store.create_post(author_id, &body.text).await?;

    state.fanout.enqueue(post_id);
    info!(post_id = %post_id, author_id = %author_id, "Post created, fan-out queued");

    Ok(HttpResponse::Created().json(serde_json::json!({ "id": post_id })))
}
