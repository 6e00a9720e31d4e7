pub mod feed;
pub mod friends;
pub mod health;
pub mod posts;
pub mod wsroute;

use crate::error::{FeedError, Result};
use actix_web::{web, HttpRequest};
use uuid::Uuid;

/// Header carrying the caller's id, set by the authenticating proxy
pub const USER_ID_HEADER: &str = "X-User-Id";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health)
        .service(health::prometheus_metrics)
        .service(
            web::scope("/api/v1")
                .service(posts::create_post)
                .service(feed::get_feed)
                .service(feed::refresh_feed)
                .service(friends::add_friend)
                .service(friends::remove_friend)
                .service(wsroute::feed_ws),
        );
}

pub(crate) fn caller_id(req: &HttpRequest) -> Result<Uuid> {
    req.headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or(FeedError::Unauthorized)
}
