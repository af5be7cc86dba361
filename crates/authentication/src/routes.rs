use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;

use app_error::{AppError, AppResult};
use app_models::{
    CaptchaResponse, ChangePasswordInput, Claims, LoginInput, LogoutInput, MeResponse,
    RefreshInput, RefreshResponse, TokenResponse,
};

use crate::{
    middleware::{ClientIp, ClientIpResolver, require_access_token, security_headers_middleware},
    service::{AuthService, LoginAttempt},
};

/// Auth API routes. Must be served with connect info so the client address
/// is known; `client_ips` decides when proxy headers are believed.
pub fn create_routes(service: Arc<AuthService>, client_ips: ClientIpResolver) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/auth/password", post(change_password))
        .route_layer(middleware::from_fn_with_state(
            service.clone(),
            require_access_token,
        ));

    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/captcha", post(captcha))
        .route("/health", get(health_check))
        .merge(protected)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(Extension(client_ips))
        .with_state(service)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn login(
    State(service): State<Arc<AuthService>>,
    ClientIp(client): ClientIp,
    Json(input): Json<LoginInput>,
) -> AppResult<Json<TokenResponse>> {
    let client = client.to_string();
    let mut attempt =
        LoginAttempt::new(&input.username, &input.password, &client).remember(input.remember);
    if let (Some(id), Some(code)) = (&input.captcha_id, &input.captcha_code) {
        attempt = attempt.with_captcha(id, code);
    }

    let session = service.login_with(&attempt).await?;
    Ok(Json(TokenResponse::new(
        &session.access,
        session.refresh.as_ref(),
    )))
}

async fn refresh(
    State(service): State<Arc<AuthService>>,
    ClientIp(client): ClientIp,
    Json(input): Json<RefreshInput>,
) -> AppResult<Json<RefreshResponse>> {
    let access = service
        .refresh(&input.refresh_token, &client.to_string())
        .await?;
    Ok(Json(RefreshResponse {
        access_token: access.token,
        token_type: "bearer".to_string(),
        expires_in: access.claims.exp - access.claims.iat,
    }))
}

async fn captcha(
    State(service): State<Arc<AuthService>>,
    ClientIp(client): ClientIp,
) -> AppResult<Json<CaptchaResponse>> {
    let challenge = service.issue_captcha(&client.to_string()).await?;
    Ok(Json(CaptchaResponse {
        captcha_image: challenge.image(),
        captcha_id: challenge.id,
        expire_in: challenge.expires_in,
    }))
}

async fn logout(
    State(service): State<Arc<AuthService>>,
    Extension(claims): Extension<Claims>,
    body: Bytes,
) -> AppResult<StatusCode> {
    // The body is optional
    let input: LogoutInput = if body.is_empty() {
        LogoutInput::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::validation("body", &e.to_string()))?
    };

    service
        .logout_session(&claims, input.refresh_token.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(Extension(claims): Extension<Claims>) -> Json<MeResponse> {
    Json(MeResponse::from(&claims))
}

async fn change_password(
    State(service): State<Arc<AuthService>>,
    Extension(claims): Extension<Claims>,
    Json(input): Json<ChangePasswordInput>,
) -> AppResult<StatusCode> {
    service
        .change_password(&claims, &input.old_password, &input.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
