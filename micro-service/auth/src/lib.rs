use axum::Router;
use std::{sync::Arc, time::Duration};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use app_authentication::{AuthService, ClientIpResolver, PasswordHasher, bootstrap, routes};
use app_cache::{Cache, MemoryCache, RedisCache};
use app_config::{AuthConfig, CacheConfig, ServerConfig};
use app_database::{MemoryUserStore, TimedUserStore};
use app_error::AppResult;
use app_utils::SystemClock;

/// Opens the configured cache backend. `memory` selects the in-process cache.
pub async fn build_cache(config: &CacheConfig) -> AppResult<Arc<dyn Cache>> {
    if config.is_memory() {
        warn!("using in-process cache; revocations and counters are not shared");
        return Ok(Arc::new(MemoryCache::new()));
    }

    let cache = RedisCache::connect(config).await?;
    Ok(Arc::new(cache))
}

/// Wires the authentication core from configuration.
pub async fn build_service(config: &AuthConfig) -> AppResult<Arc<AuthService>> {
    let cache = build_cache(&config.cache).await?;
    let hasher = Arc::new(PasswordHasher::new(&config.password.argon2)?);

    let users = Arc::new(MemoryUserStore::new());
    if let Some(admin) = &config.bootstrap_admin {
        bootstrap::seed_admin(&users, &hasher, &config.password, admin).await?;
    } else {
        warn!("no bootstrap admin configured; the user store starts empty");
    }
    let store = Arc::new(TimedUserStore::new(users, config.store.operation_timeout()));

    let service = AuthService::with_hasher(config, store, cache, Arc::new(SystemClock), hasher)?;
    Ok(Arc::new(service))
}

/// HTTP application with request tracing, request ids and a request timeout.
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn build_app(service: Arc<AuthService>, server: &ServerConfig) -> Router {
    if !server.trusted_proxies.is_empty() {
        info!(proxies = ?server.trusted_proxies, "forwarding headers trusted from proxies");
    }
    let client_ips = ClientIpResolver::new(server.trusted_proxies.clone());

    routes::create_routes(service, client_ips)
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

pub fn bind_address(server: &ServerConfig) -> String {
    let address = format!("{}:{}", server.host, server.port);
    info!("auth service will listen on {}", address);
    address
}
