use axum::{
    Router,
    body::{Body, to_bytes},
    extract::connect_info::MockConnectInfo,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use tower::ServiceExt;

use app_config::{AuthConfig, BootstrapAdmin};
use micro_auth::{build_app, build_service};

const ADMIN_PASSWORD: &str = "Sup3rSecret";

fn test_config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.cache.url = "memory".to_string();
    config.password.argon2.memory = 1024;
    config.password.argon2.iterations = 1;
    config.bootstrap_admin = Some(BootstrapAdmin {
        username: "root".to_string(),
        password: ADMIN_PASSWORD.to_string(),
    });
    config
}

// Helper function to create a test app instance
async fn setup_test_app(config: AuthConfig) -> Router {
    let service = build_service(&config)
        .await
        .expect("service should build with an in-memory cache");
    build_app(service, &config.server)
        .layer(MockConnectInfo(SocketAddr::from(([192, 0, 2, 44], 52_000))))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &Router, password: &str) -> Response {
    send(
        app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "root", "password": password, "remember": true })),
    )
    .await
}

#[tokio::test]
async fn test_full_session_flow() {
    let app = setup_test_app(test_config()).await;

    let response = login(&app, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let tokens = json_body(response).await;
    let access = tokens["access_token"].as_str().unwrap().to_string();
    let refresh = tokens["refresh_token"].as_str().unwrap().to_string();

    let response = send(&app, Method::GET, "/auth/me", Some(&access), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let me = json_body(response).await;
    assert_eq!(me["username"], "root");
    assert_eq!(me["is_superuser"], true);

    let response = send(
        &app,
        Method::POST,
        "/auth/refresh",
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed = json_body(response).await;
    assert!(refreshed["access_token"].as_str().is_some());
    assert!(refreshed.get("refresh_token").is_none());

    let response = send(
        &app,
        Method::POST,
        "/auth/logout",
        Some(&access),
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, Method::GET, "/auth/me", Some(&access), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["code"], "TOKEN_REVOKED");

    let response = send(
        &app,
        Method::POST,
        "/auth/refresh",
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_token_is_not_a_bearer_token() {
    let app = setup_test_app(test_config()).await;
    let tokens = json_body(login(&app, ADMIN_PASSWORD).await).await;
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let response = send(&app, Method::GET, "/auth/me", Some(refresh), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["code"], "TOKEN_WRONG_TYPE");
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = setup_test_app(test_config()).await;

    let wrong_password = login(&app, "not-the-password").await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    let wrong_password = json_body(wrong_password).await;

    let unknown_user = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "nobody", "password": ADMIN_PASSWORD })),
    )
    .await;
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(wrong_password, json_body(unknown_user).await);
}

#[tokio::test]
async fn test_login_rate_limiting() {
    let mut config = test_config();
    config.rate_limiting.login.max_attempts = 2;
    let app = setup_test_app(config).await;

    for _ in 0..2 {
        assert_eq!(
            login(&app, "not-the-password").await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    let response = login(&app, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(json_body(response).await["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_password_change_flow() {
    let app = setup_test_app(test_config()).await;
    let tokens = json_body(login(&app, ADMIN_PASSWORD).await).await;
    let access = tokens["access_token"].as_str().unwrap();

    let response = send(
        &app,
        Method::POST,
        "/auth/password",
        Some(access),
        Some(json!({ "old_password": ADMIN_PASSWORD, "new_password": "Brand-New-Pass9" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, Method::GET, "/auth/me", Some(access), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(
        login(&app, ADMIN_PASSWORD).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        login(&app, "Brand-New-Pass9").await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_malformed_requests() {
    let app = setup_test_app(test_config()).await;

    let response = send(&app, Method::GET, "/auth/me", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

    let response = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "root" })),
    )
    .await;
    assert!(response.status().is_client_error());

    let response = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_short_session_without_remember() {
    let app = setup_test_app(test_config()).await;

    let response = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "root", "password": ADMIN_PASSWORD })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let tokens = json_body(response).await;
    assert!(tokens.get("refresh_token").is_none());

    let access = tokens["access_token"].as_str().unwrap();
    let response = send(&app, Method::GET, "/auth/me", Some(access), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_captcha_gated_login() {
    let mut config = test_config();
    config.captcha.enabled = true;
    let app = setup_test_app(config).await;

    let response = login(&app, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_CAPTCHA");

    let response = send(&app, Method::POST, "/auth/captcha", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let challenge = json_body(response).await;
    assert!(challenge["captcha_id"].as_str().is_some());
    assert!(
        challenge["captcha_image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/svg+xml;base64,")
    );

    // A wrong answer burns the challenge, so the next try needs a new one
    let response = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({
            "username": "root",
            "password": ADMIN_PASSWORD,
            "captcha_id": challenge["captcha_id"],
            "captcha_code": "----",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_forwarded_for_needs_a_trusted_proxy() {
    let mut config = test_config();
    config.rate_limiting.login.max_attempts = 1;
    let app = setup_test_app(config).await;

    let spoofed = |ip: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Forwarded-For", ip)
            .body(Body::from(
                json!({ "username": "root", "password": "not-the-password" }).to_string(),
            ))
            .unwrap()
    };

    let response = app.clone().oneshot(spoofed("198.51.100.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.oneshot(spoofed("198.51.100.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
