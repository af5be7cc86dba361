use tracing::info;

use app_config::{BootstrapAdmin, PasswordConfig};
use app_database::MemoryUserStore;
use app_error::AppResult;
use app_models::CredentialRecord;
use app_utils::generate_token_id;

use crate::{password::PasswordHasher, validation};

/// Seeds the configured administrator into an in-memory store.
/// Returns the id of the new account, or `None` when the username is taken.
pub async fn seed_admin(
    store: &MemoryUserStore,
    hasher: &PasswordHasher,
    policy: &PasswordConfig,
    admin: &BootstrapAdmin,
) -> AppResult<Option<String>> {
    let username = validation::sanitize_string(&admin.username);
    validation::validate_username(&username)?;
    validation::validate_password(&admin.password, policy)?;

    if store.contains(&username).await {
        info!(username = %username, "bootstrap admin already present");
        return Ok(None);
    }

    let id = generate_token_id();
    let hash = hasher.hash(&admin.password)?;
    store
        .insert(CredentialRecord::new(id.clone(), username.clone(), hash).superuser())
        .await;

    info!(username = %username, id = %id, "seeded bootstrap admin");
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::fast_hasher;
    use app_config::AuthConfig;
    use app_database::UserStore;

    fn admin(password: &str) -> BootstrapAdmin {
        BootstrapAdmin {
            username: " root ".to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn seeds_a_superuser_once() {
        let store = MemoryUserStore::new();
        let hasher = fast_hasher();
        let policy = AuthConfig::default().password;

        let id = seed_admin(&store, &hasher, &policy, &admin("Sup3rSecret"))
            .await
            .unwrap()
            .unwrap();

        let record = store.get_credential_record("root").await.unwrap().unwrap();
        assert_eq!(record.id, id);
        assert!(record.is_superuser);
        assert!(hasher.verify("Sup3rSecret", &record.password_hash));

        let again = seed_admin(&store, &hasher, &policy, &admin("Sup3rSecret"))
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn weak_password_is_refused() {
        let store = MemoryUserStore::new();
        let policy = AuthConfig::default().password;
        assert!(
            seed_admin(&store, &fast_hasher(), &policy, &admin("short"))
                .await
                .is_err()
        );
        assert!(store.is_empty().await);
    }
}
