//! End-to-end tests of the HTTP surface against an in-memory database

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, LOCATION},
        Request, StatusCode,
    },
    response::Response,
    Router,
};
use emoji_gallery::{
    api::routes::create_router,
    backend::{GenerateRequest, GenerateResponse, ImageBackend},
    config::{SessionConfig, Settings},
    db::{Database, GeneratedItem, ItemStore},
    service::GenerationPipeline,
    storage::LocalStore,
    AppState,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgoAAAAA";
const URL_PREFIX: &str = "http://localhost:8080/images";

/// Provider that answers every prompt with the same inline image
#[derive(Default)]
struct StubBackend {
    delay: Duration,
}

#[async_trait]
impl ImageBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, _request: GenerateRequest) -> emoji_gallery::Result<GenerateResponse> {
        tokio::time::sleep(self.delay).await;
        Ok(GenerateResponse {
            id: None,
            outputs: vec![PNG_DATA_URL.to_string()],
        })
    }
}

struct TestApp {
    router: Router,
    db: Database,
    _storage_dir: TempDir,
}

async fn create_test_app(configure: impl FnOnce(&mut Settings)) -> TestApp {
    create_test_app_with_backend(StubBackend::default(), configure).await
}

async fn create_test_app_with_backend(
    backend: StubBackend,
    configure: impl FnOnce(&mut Settings),
) -> TestApp {
    let storage_dir = TempDir::new().unwrap();

    let mut settings = Settings::default();
    settings.auth.sessions = vec![
        SessionConfig {
            token: "tok-alice".to_string(),
            user_id: "alice".to_string(),
        },
        SessionConfig {
            token: "tok-bob".to_string(),
            user_id: "bob".to_string(),
        },
    ];
    settings.storage.base_path = storage_dir.path().to_string_lossy().to_string();
    settings.storage.public_url_prefix = URL_PREFIX.to_string();
    settings.rate_limit.generations_per_minute = 100;
    settings.rate_limit.burst_size = 100;
    configure(&mut settings);

    let db = Database::connect("sqlite::memory:", 1).await.unwrap();
    db.migrate().await.unwrap();

    let pipeline = GenerationPipeline::new(
        Arc::new(backend),
        Arc::new(LocalStore::new(storage_dir.path(), URL_PREFIX)),
        reqwest::Client::new(),
        settings.storage.bucket.clone(),
        settings.generation.max_prompt_chars,
    );

    let state = Arc::new(AppState {
        settings: Arc::new(settings),
        db: db.clone(),
        pipeline,
    });

    TestApp {
        router: create_router(state).unwrap(),
        db,
        _storage_dir: storage_dir,
    }
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn generate(app: &TestApp, token: &str, prompt: &str) -> Value {
    let response = app
        .router
        .clone()
        .oneshot(post("/generate", Some(token), json!({ "prompt": prompt })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

async fn like(app: &TestApp, token: &str, item_id: &str, action: &str) -> Response {
    app.router
        .clone()
        .oneshot(post(
            "/like",
            Some(token),
            json!({ "itemId": item_id, "action": action }),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app(|_| {}).await;

    let response = app.router.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["database"], "ok");
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let app = create_test_app(|_| {}).await;

    let generate = app
        .router
        .clone()
        .oneshot(post("/generate", None, json!({ "prompt": "cat" })))
        .await
        .unwrap();
    assert_eq!(generate.status(), StatusCode::UNAUTHORIZED);

    let like = app
        .router
        .clone()
        .oneshot(post("/like", Some("forged"), json!({ "itemId": "x", "action": "like" })))
        .await
        .unwrap();
    assert_eq!(like.status(), StatusCode::UNAUTHORIZED);

    let me = app.router.clone().oneshot(get("/me", None)).await.unwrap();
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_generate_returns_item_owned_by_caller() {
    let app = create_test_app(|_| {}).await;

    let item = generate(&app, "tok-alice", "happy cat").await;
    assert_eq!(item["prompt"], "happy cat");
    assert_eq!(item["creator_user_id"], "alice");
    assert_eq!(item["likes_count"], 0);
    assert!(item["image_url"]
        .as_str()
        .unwrap()
        .starts_with("http://localhost:8080/images/emojis/"));
}

#[tokio::test]
async fn test_generate_rejects_empty_prompt() {
    let app = create_test_app(|_| {}).await;

    let response = app
        .router
        .clone()
        .oneshot(post("/generate", Some("tok-alice"), json!({ "prompt": "  " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_generate_rejects_malformed_body() {
    let app = create_test_app(|_| {}).await;

    let response = app
        .router
        .clone()
        .oneshot(post("/generate", Some("tok-alice"), json!({ "text": "cat" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generated_image_is_served_and_downloadable() {
    let app = create_test_app(|_| {}).await;
    let item = generate(&app, "tok-alice", "party parrot").await;
    let image_url = item["image_url"].as_str().unwrap().to_string();

    let download = app
        .router
        .clone()
        .oneshot(get(&format!("/items/{}/download", item["id"].as_str().unwrap()), None))
        .await
        .unwrap();
    assert_eq!(download.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(download.headers()[LOCATION], image_url.as_str());

    let served_path = image_url.strip_prefix("http://localhost:8080").unwrap();
    let served = app.router.clone().oneshot(get(served_path, None)).await.unwrap();
    assert_eq!(served.status(), StatusCode::OK);

    let missing = app
        .router
        .clone()
        .oneshot(get("/items/unknown/download", None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_with_unusable_url_is_error_response() {
    let app = create_test_app(|_| {}).await;
    let item = GeneratedItem::new("cat", "http://img/\ncat.png", "alice");
    app.db.insert_item(&item).await.unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/items/{}/download", item.id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"]["type"], "server_error");
}

#[tokio::test]
async fn test_slow_request_times_out_with_error_body() {
    let backend = StubBackend {
        delay: Duration::from_millis(2_500),
    };
    let app = create_test_app_with_backend(backend, |settings| {
        settings.server.request_timeout_secs = 1;
    })
    .await;

    let response = app
        .router
        .clone()
        .oneshot(post("/generate", Some("tok-alice"), json!({ "prompt": "slow cat" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json_body(response).await["error"]["type"], "timeout_error");
}

#[tokio::test]
async fn test_list_items_newest_first() {
    let app = create_test_app(|_| {}).await;
    generate(&app, "tok-alice", "first").await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    generate(&app, "tok-bob", "second").await;

    let response = app.router.clone().oneshot(get("/items", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let items = json_body(response).await;
    let prompts: Vec<_> = items
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["prompt"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(prompts, vec!["second", "first"]);
}

#[tokio::test]
async fn test_like_flow() {
    let app = create_test_app(|_| {}).await;
    let item = generate(&app, "tok-alice", "happy cat").await;
    let id = item["id"].as_str().unwrap();

    let response = like(&app, "tok-alice", id, "like").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["likes_count"], 1);

    let again = like(&app, "tok-alice", id, "like").await;
    assert_eq!(json_body(again).await["likes_count"], 1);

    let bob = like(&app, "tok-bob", id, "like").await;
    assert_eq!(json_body(bob).await["likes_count"], 2);

    let unlike = like(&app, "tok-alice", id, "unlike").await;
    assert_eq!(json_body(unlike).await["likes_count"], 1);

    // bob still has a like row, so this one is real
    let unlike = like(&app, "tok-bob", id, "unlike").await;
    assert_eq!(json_body(unlike).await["likes_count"], 0);
}

#[tokio::test]
async fn test_default_mode_decrements_on_unlike_without_like() {
    let app = create_test_app(|_| {}).await;
    let item = generate(&app, "tok-alice", "happy cat").await;
    let id = item["id"].as_str().unwrap();

    like(&app, "tok-alice", id, "like").await;
    let phantom = like(&app, "tok-bob", id, "unlike").await;
    assert_eq!(phantom.status(), StatusCode::OK);
    assert_eq!(json_body(phantom).await["likes_count"], 0);
}

#[tokio::test]
async fn test_atomic_mode_ignores_unlike_without_like() {
    let app = create_test_app(|settings| {
        settings.likes.consistency = emoji_gallery::config::LikeConsistency::Atomic;
    })
    .await;
    let item = generate(&app, "tok-alice", "happy cat").await;
    let id = item["id"].as_str().unwrap();

    like(&app, "tok-alice", id, "like").await;
    let phantom = like(&app, "tok-bob", id, "unlike").await;
    assert_eq!(phantom.status(), StatusCode::OK);
    assert_eq!(json_body(phantom).await["likes_count"], 1);

    let again = like(&app, "tok-alice", id, "like").await;
    assert_eq!(json_body(again).await["likes_count"], 1);
}

#[tokio::test]
async fn test_like_rejects_bad_action_and_unknown_item() {
    let app = create_test_app(|_| {}).await;
    let item = generate(&app, "tok-alice", "happy cat").await;

    let bad_action = like(&app, "tok-alice", item["id"].as_str().unwrap(), "love").await;
    assert_eq!(bad_action.status(), StatusCode::BAD_REQUEST);

    let unknown = like(&app, "tok-alice", "no-such-item", "like").await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_me_creates_profile() {
    let app = create_test_app(|_| {}).await;

    let response = app.router.clone().oneshot(get("/me", Some("tok-bob"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let profile = json_body(response).await;
    assert_eq!(profile["user_id"], "bob");
    assert_eq!(profile["credits"], 3);
    assert_eq!(profile["tier"], "free");
}

#[tokio::test]
async fn test_generate_rate_limited_per_user() {
    let app = create_test_app(|settings| {
        settings.rate_limit.generations_per_minute = 1;
        settings.rate_limit.burst_size = 1;
    })
    .await;

    generate(&app, "tok-alice", "one").await;

    let second = app
        .router
        .clone()
        .oneshot(post("/generate", Some("tok-alice"), json!({ "prompt": "two" })))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    generate(&app, "tok-bob", "three").await;

    // likes are not rate limited
    let items = json_body(app.router.clone().oneshot(get("/items", None)).await.unwrap()).await;
    let id = items[0]["id"].as_str().unwrap();
    for _ in 0..3 {
        assert_eq!(like(&app, "tok-alice", id, "like").await.status(), StatusCode::OK);
    }
}
