use actix_web::{http::StatusCode, test, web, App};
use feed_fanout::cache::InMemoryFeedCache;
use feed_fanout::config::{FeedSettings, GatewaySettings};
use feed_fanout::fanout::{run_fanout_worker, FanoutCoordinator, FanoutQueue};
use feed_fanout::feed::FeedReader;
use feed_fanout::gateway::DeliveryGateway;
use feed_fanout::registry::InMemorySubscriberRegistry;
use feed_fanout::routes::{self, USER_ID_HEADER};
use feed_fanout::state::AppState;
use feed_fanout::store::InMemoryPostStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

struct Harness {
    state: web::Data<AppState>,
    store: InMemoryPostStore,
    _shutdown: watch::Sender<bool>,
}

fn harness() -> Harness {
    let store = InMemoryPostStore::new();
    let cache = InMemoryFeedCache::new();
    let registry = Arc::new(InMemorySubscriberRegistry::new());
    let settings = FeedSettings::default();

    let coordinator = Arc::new(FanoutCoordinator::new(
        Arc::new(store.clone()),
        Arc::new(cache.clone()),
        registry.clone(),
        None,
        settings.clone(),
    ));
    let (fanout, jobs) = FanoutQueue::new(coordinator.clone(), 16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(run_fanout_worker(coordinator, jobs, shutdown_rx));

    let state = web::Data::new(AppState {
        store: Arc::new(store.clone()),
        reader: FeedReader::new(Arc::new(store.clone()), Arc::new(cache), settings),
        fanout,
        gateway: DeliveryGateway::new("test", registry, Duration::from_secs(30)),
        gateway_settings: GatewaySettings::default(),
    });

    Harness {
        state,
        store,
        _shutdown: shutdown_tx,
    }
}

#[actix_rt::test]
async fn post_then_follower_reads_it() {
    let h = harness();
    let (author, reader) = (Uuid::new_v4(), Uuid::new_v4());
    h.store.add_user(author, "Author").await;
    h.store.add_user(reader, "Reader").await;

    let app = test::init_service(
        App::new()
            .app_data(h.state.clone())
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/friends/{}", author))
        .insert_header((USER_ID_HEADER, reader.to_string()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header((USER_ID_HEADER, author.to_string()))
        .set_json(json!({ "text": "hello followers" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert!(created["id"].is_string());

    // Fan-out runs in the background; the read path serves the post either way
    let req = test::TestRequest::get()
        .uri("/api/v1/feed")
        .insert_header((USER_ID_HEADER, reader.to_string()))
        .to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["items"][0]["text"], "hello followers");
    assert_eq!(page["items"][0]["authorName"], "Author");
    assert_eq!(page["items"][0]["id"], created["id"]);
}

#[actix_rt::test]
async fn requests_without_identity_are_unauthorized() {
    let h = harness();
    let app = test::init_service(
        App::new()
            .app_data(h.state.clone())
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/feed").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/v1/feed")
        .insert_header((USER_ID_HEADER, "not-a-uuid"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn invalid_input_is_bad_request() {
    let h = harness();
    let user = Uuid::new_v4();
    h.store.add_user(user, "User").await;
    let app = test::init_service(
        App::new()
            .app_data(h.state.clone())
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header((USER_ID_HEADER, user.to_string()))
        .set_json(json!({ "text": "   " }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/friends/{}", user))
        .insert_header((USER_ID_HEADER, user.to_string()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn unfollow_is_idempotent() {
    let h = harness();
    let app = test::init_service(
        App::new()
            .app_data(h.state.clone())
            .configure(routes::configure),
    )
    .await;

    let (user, friend) = (Uuid::new_v4(), Uuid::new_v4());
    for _ in 0..2 {
        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/friends/{}", friend))
            .insert_header((USER_ID_HEADER, user.to_string()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
    }
}

#[actix_rt::test]
async fn health_and_metrics_are_served() {
    let h = harness();
    let app = test::init_service(
        App::new()
            .app_data(h.state.clone())
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["instance_id"], "test");

    let req = test::TestRequest::get().uri("/metrics").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_rt::test]
async fn unknown_users_are_not_found() {
    let h = harness();
    let user = Uuid::new_v4();
    h.store.add_user(user, "User").await;
    let app = test::init_service(
        App::new()
            .app_data(h.state.clone())
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/friends/{}", Uuid::new_v4()))
        .insert_header((USER_ID_HEADER, user.to_string()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
        .set_json(json!({ "text": "who am I" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}
