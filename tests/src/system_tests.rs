use futures::future::join_all;
use std::sync::Arc;

use app_authentication::AuthService;
use app_cache::{Cache, MemoryCache};
use app_config::AuthConfig;
use app_database::{MemoryUserStore, UserStore};
use app_error::AppError;
use app_models::CredentialRecord;
use app_utils::{Clock, ManualClock};

const PASSWORD: &str = "Wonderland42";
const CLIENT: &str = "198.51.100.20";

struct System {
    service: Arc<AuthService>,
    store: Arc<MemoryUserStore>,
    cache: Arc<MemoryCache>,
    clock: ManualClock,
}

fn test_config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.password.argon2.memory = 1024;
    config.password.argon2.iterations = 1;
    config.lockout.threshold = 5;
    config.lockout.duration_secs = 900;
    config
}

async fn setup_system(config: AuthConfig) -> System {
    let clock = ManualClock::starting_now();
    let store = Arc::new(MemoryUserStore::new());
    let cache = Arc::new(MemoryCache::with_clock(Arc::new(clock.clone())));
    let service = AuthService::new(&config, store.clone(), cache.clone(), Arc::new(clock.clone()))
        .expect("service should build from the test config");

    let hash = service.hasher().hash(PASSWORD).unwrap();
    store
        .insert(CredentialRecord::new("u-alice", "alice", hash))
        .await;

    System {
        service: Arc::new(service),
        store,
        cache,
        clock,
    }
}

#[tokio::test]
async fn lockout_lifecycle() {
    let system = setup_system(test_config()).await;

    for attempt in 1..=5 {
        let err = system
            .service
            .login("alice", "wrong-password", CLIENT)
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::InvalidCredentials),
            "attempt {} returned {:?}",
            attempt,
            err
        );
    }

    // Correct password, but the account is locked
    let err = system
        .service
        .login("alice", PASSWORD, CLIENT)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountLocked { retry_after_secs: 900 }));

    system.clock.advance_secs(899);
    let err = system
        .service
        .login("alice", PASSWORD, CLIENT)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountLocked { retry_after_secs: 1 }));

    system.clock.advance_secs(1);
    system
        .service
        .login("alice", PASSWORD, CLIENT)
        .await
        .expect("lock should have expired");

    let record = system
        .store
        .get_credential_record("alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.failed_attempts, 0);
    assert!(record.locked_until.is_none());
}

#[tokio::test]
async fn concurrent_failures_lock_the_account() {
    let system = setup_system(test_config()).await;

    let attempts = (0..12).map(|i| {
        let service = system.service.clone();
        let client = format!("10.0.0.{}", i);
        tokio::spawn(async move { service.login("alice", "wrong-password", &client).await })
    });
    for result in join_all(attempts).await {
        assert!(result.unwrap().is_err());
    }

    let record = system
        .store
        .get_credential_record("alice")
        .await
        .unwrap()
        .unwrap();
    assert!(record.locked_until.is_some());
    assert!(matches!(
        system.service.login("alice", PASSWORD, CLIENT).await,
        Err(AppError::AccountLocked { .. })
    ));
}

#[tokio::test]
async fn session_lifecycle() {
    let system = setup_system(test_config()).await;
    let pair = system.service.login("alice", PASSWORD, CLIENT).await.unwrap();

    let claims = system.service.authenticate(&pair.access.token).await.unwrap();
    assert_eq!(claims.sub, "u-alice");

    // A refresh token is never accepted as an access token
    assert!(matches!(
        system.service.authenticate(&pair.refresh.token).await,
        Err(AppError::WrongTokenType { .. })
    ));

    let access = system
        .service
        .refresh(&pair.refresh.token, CLIENT)
        .await
        .unwrap();
    assert_eq!(access.claims.sub, "u-alice");
    assert_ne!(access.claims.jti, pair.access.claims.jti);

    system
        .service
        .logout(&pair.access.token, Some(&pair.refresh.token))
        .await
        .unwrap();

    assert!(matches!(
        system.service.authenticate(&pair.access.token).await,
        Err(AppError::TokenRevoked)
    ));
    assert!(matches!(
        system.service.refresh(&pair.refresh.token, CLIENT).await,
        Err(AppError::TokenRevoked)
    ));
    // Tokens minted before logout stay valid on their own
    system.service.authenticate(&access.token).await.unwrap();
}

#[tokio::test]
async fn revocation_entries_expire_with_the_token() {
    let config = test_config();
    let leeway = config.jwt.leeway_secs as i64;
    let access_ttl = config.jwt.access_ttl_secs().unwrap();
    let system = setup_system(config).await;

    let pair = system.service.login("alice", PASSWORD, CLIENT).await.unwrap();
    system.service.logout(&pair.access.token, None).await.unwrap();

    let key = format!("jwt:blacklist:{}", pair.access.claims.jti);
    assert!(system.cache.exists(&key).await.unwrap());
    assert_eq!(system.cache.ttl(&key).await, Some(access_ttl + leeway));

    system.clock.advance_secs(access_ttl + leeway);
    assert!(!system.cache.exists(&key).await.unwrap());
    assert!(matches!(
        system.service.authenticate(&pair.access.token).await,
        Err(AppError::TokenExpired)
    ));
}

#[tokio::test]
async fn access_token_expires_after_leeway() {
    let config = test_config();
    let leeway = config.jwt.leeway_secs as i64;
    let access_ttl = config.jwt.access_ttl_secs().unwrap();
    let system = setup_system(config).await;

    let pair = system.service.login("alice", PASSWORD, CLIENT).await.unwrap();

    system.clock.advance_secs(access_ttl + leeway - 1);
    system.service.authenticate(&pair.access.token).await.unwrap();

    system.clock.advance_secs(1);
    assert!(matches!(
        system.service.authenticate(&pair.access.token).await,
        Err(AppError::TokenExpired)
    ));

    // The refresh token outlives the access token
    system
        .service
        .refresh(&pair.refresh.token, CLIENT)
        .await
        .unwrap();
}

#[tokio::test]
async fn login_rate_limit_per_window() {
    let mut config = test_config();
    config.rate_limiting.login.max_attempts = 3;
    config.rate_limiting.login.window_secs = 60;
    let system = setup_system(config).await;

    for _ in 0..3 {
        assert!(matches!(
            system.service.login("mallory", "guess", CLIENT).await,
            Err(AppError::InvalidCredentials)
        ));
    }

    let err = system
        .service
        .login("alice", PASSWORD, CLIENT)
        .await
        .unwrap_err();
    let AppError::RateLimited { retry_after_secs } = err else {
        panic!("expected RateLimited, got {:?}", err);
    };
    assert!((1..=60).contains(&retry_after_secs));

    // Other clients keep their own budget
    system
        .service
        .login("alice", PASSWORD, "203.0.113.9")
        .await
        .unwrap();

    system.clock.advance_secs(retry_after_secs as i64);
    system.service.login("alice", PASSWORD, CLIENT).await.unwrap();
}

#[tokio::test]
async fn password_change_signs_out_every_session() {
    let system = setup_system(test_config()).await;
    let first = system.service.login("alice", PASSWORD, CLIENT).await.unwrap();
    let second = system.service.login("alice", PASSWORD, CLIENT).await.unwrap();

    system.clock.advance_secs(10);
    system
        .service
        .change_password(&second.access.claims, PASSWORD, "Looking-Glass7")
        .await
        .unwrap();

    for token in [&first.access.token, &second.access.token] {
        assert!(matches!(
            system.service.authenticate(token).await,
            Err(AppError::TokenRevoked)
        ));
    }
    assert!(matches!(
        system.service.refresh(&first.refresh.token, CLIENT).await,
        Err(AppError::TokenRevoked)
    ));

    assert!(matches!(
        system.service.login("alice", PASSWORD, CLIENT).await,
        Err(AppError::InvalidCredentials)
    ));

    system.clock.advance_secs(1);
    let fresh = system
        .service
        .login("alice", "Looking-Glass7", CLIENT)
        .await
        .unwrap();
    system.service.authenticate(&fresh.access.token).await.unwrap();
}

#[tokio::test]
async fn password_change_in_the_issuing_second_revokes_everything() {
    let system = setup_system(test_config()).await;
    let first = system.service.login("alice", PASSWORD, CLIENT).await.unwrap();
    let second = system.service.login("alice", PASSWORD, CLIENT).await.unwrap();

    // No clock movement: every token shares the change's second
    system
        .service
        .change_password(&first.access.claims, PASSWORD, "Looking-Glass7")
        .await
        .unwrap();

    for pair in [&first, &second] {
        assert!(matches!(
            system.service.authenticate(&pair.access.token).await,
            Err(AppError::TokenRevoked)
        ));
        assert!(matches!(
            system.service.refresh(&pair.refresh.token, CLIENT).await,
            Err(AppError::TokenRevoked)
        ));
    }

    let record = system
        .store
        .get_credential_record("alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.token_version, 1);
}

#[tokio::test]
async fn lockout_expiry_race_keeps_the_new_lock() {
    let system = setup_system(test_config()).await;
    for _ in 0..5 {
        system
            .service
            .login("alice", "wrong-password", CLIENT)
            .await
            .unwrap_err();
    }
    system.clock.advance_secs(900);

    // Expired lock cleared by one request, then re-earned by five more
    for _ in 0..5 {
        system
            .service
            .login("alice", "wrong-password", CLIENT)
            .await
            .unwrap_err();
    }
    let record = system
        .store
        .get_credential_record("alice")
        .await
        .unwrap()
        .unwrap();
    assert!(record.is_locked_at(system.clock.now()));
    assert!(matches!(
        system.service.login("alice", PASSWORD, CLIENT).await,
        Err(AppError::AccountLocked { .. })
    ));
}

#[tokio::test]
async fn outages_fail_closed() {
    let system = setup_system(test_config()).await;
    let pair = system.service.login("alice", PASSWORD, CLIENT).await.unwrap();

    system.cache.set_unavailable(true);
    assert!(matches!(
        system.service.authenticate(&pair.access.token).await,
        Err(AppError::DependencyUnavailable(_))
    ));
    system.cache.set_unavailable(false);

    system.store.set_unavailable(true);
    assert!(matches!(
        system.service.login("alice", PASSWORD, CLIENT).await,
        Err(AppError::DependencyUnavailable(_))
    ));
    system.store.set_unavailable(false);

    system.service.authenticate(&pair.access.token).await.unwrap();
}
