use super::caller_id;
use crate::error::Result;
use crate::state::AppState;
use actix_web::{get, post, web, HttpRequest, HttpResponse};

#[get("/feed")]
pub async fn get_feed(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let subscriber_id = caller_id(&req)?;
    let page = state.reader.read_feed(subscriber_id).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[post("/feed/refresh")]
pub async fn refresh_feed(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let subscriber_id = caller_id(&req)?;
    let page = state.reader.refresh(subscriber_id).await?;
    Ok(HttpResponse::Ok().json(page))
}
