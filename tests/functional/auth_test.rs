//! Functional tests for session authentication

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, HeaderName, Request, StatusCode},
    Extension, Router,
};
use emoji_gallery::middleware::{AuthLayer, Identity, SessionResolver};
use tower::ServiceExt;

async fn whoami(Extension(identity): Extension<Identity>) -> String {
    identity.user_id
}

fn create_test_app(resolver: SessionResolver) -> Router {
    Router::new()
        .route("/me", axum::routing::get(whoami))
        .layer(AuthLayer::new(resolver))
}

fn sessions() -> SessionResolver {
    SessionResolver::new(vec![
        ("tok-alice".to_string(), "alice".to_string()),
        ("tok-bob".to_string(), "bob".to_string()),
    ])
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_auth_with_valid_bearer_token() {
    let app = create_test_app(sessions());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/me")
                .header(AUTHORIZATION, "Bearer tok-alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "alice");
}

#[tokio::test]
async fn test_auth_with_raw_token() {
    let app = create_test_app(sessions());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/me")
                .header(AUTHORIZATION, "tok-bob")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "bob");
}

#[tokio::test]
async fn test_auth_with_unknown_token() {
    let app = create_test_app(sessions());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/me")
                .header(AUTHORIZATION, "Bearer expired")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["error"]["type"], "authentication_error");
}

#[tokio::test]
async fn test_auth_without_header() {
    let app = create_test_app(sessions());

    let response = app
        .oneshot(Request::builder().uri("/me").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_no_sessions_rejects_all() {
    let app = create_test_app(SessionResolver::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/me")
                .header(AUTHORIZATION, "Bearer anything")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_trusted_proxy_header() {
    let resolver = sessions().with_trusted_header(HeaderName::from_static("x-user-id"));
    let app = create_test_app(resolver);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/me")
                .header("x-user-id", "user_from_proxy")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "user_from_proxy");
}
