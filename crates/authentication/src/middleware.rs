use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::{
    net::{IpAddr, SocketAddr},
    str::FromStr,
    sync::Arc,
};
use tracing::{debug, error, warn};

use app_error::{AppError, AppResult};

use crate::service::AuthService;

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AppError::TokenInvalidSignature)
}

/// Decides which address a request is counted under. Proxy headers are
/// only believed when the socket peer is a configured proxy.
#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    trusted_proxies: Vec<IpAddr>,
}

impl ClientIpResolver {
    pub fn new(trusted_proxies: Vec<IpAddr>) -> Self {
        Self { trusted_proxies }
    }

    fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.trusted_proxies.contains(ip)
    }

    pub fn resolve(&self, peer: IpAddr, headers: &HeaderMap) -> IpAddr {
        if !self.is_trusted(&peer) {
            return peer;
        }

        if let Some(forwarded) = headers.get("X-Forwarded-For").and_then(|v| v.to_str().ok()) {
            // Rightmost hop that is not one of our proxies; anything left of
            // it was written by the client
            for hop in forwarded.rsplit(',') {
                match IpAddr::from_str(hop.trim()) {
                    Ok(ip) if self.is_trusted(&ip) => continue,
                    Ok(ip) => return ip,
                    Err(_) => {
                        warn!(%peer, "unparsable X-Forwarded-For hop from trusted proxy");
                        return peer;
                    }
                }
            }
        }

        headers
            .get("X-Real-IP")
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| IpAddr::from_str(ip.trim()).ok())
            .unwrap_or(peer)
    }
}

/// Client address for rate limiting, taken from the connection and resolved
/// through the `ClientIpResolver` extension when one is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ConnectInfo(peer) = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                error!("peer address missing, serve with connect info: {}", e);
                AppError::ServerError(anyhow::anyhow!("Client address unavailable"))
            })?;

        let ip = match parts.extensions.get::<ClientIpResolver>() {
            Some(resolver) => resolver.resolve(peer.ip(), &parts.headers),
            None => peer.ip(),
        };
        Ok(ClientIp(ip))
    }
}

/// Rejects the request unless it carries a valid, unrevoked access token.
/// The validated `Claims` are added to the request extensions.
pub async fn require_access_token(
    State(service): State<Arc<AuthService>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .inspect_err(|_| {
            debug!(path = %req.uri().path(), "request without bearer token");
        })?
        .to_string();

    let claims = service.authenticate(&token).await.inspect_err(|e| {
        warn!(error = %e, "access token rejected");
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

// Token responses must never be cached by intermediaries
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));

    response
}
