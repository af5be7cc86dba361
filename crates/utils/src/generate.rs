use uuid::Uuid;

/// Fresh identifier for the `jti` claim. UUID v4 gives 122 random bits, so two
/// tokens from one signer never share an id in practice.
pub fn generate_token_id() -> String {
    Uuid::new_v4().simple().to_string()
}
