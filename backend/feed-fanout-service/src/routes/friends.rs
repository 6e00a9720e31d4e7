use super::caller_id;
use crate::error::Result;
use crate::models::FriendEdge;
use crate::state::AppState;
use actix_web::{delete, post, web, HttpRequest, HttpResponse};
use uuid::Uuid;

/// Follow `friend_id`. Already-cached feeds are not backfilled.
#[post("/friends/{friend_id}")]
pub async fn add_friend(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let user_id = caller_id(&req)?;
    state
        .store
        .add_friend(FriendEdge::new(user_id, path.into_inner()))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[delete("/friends/{friend_id}")]
pub async fn remove_friend(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let user_id = caller_id(&req)?;
    state
        .store
        .remove_friend(FriendEdge::new(user_id, path.into_inner()))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
