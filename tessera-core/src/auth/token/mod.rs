//! Access and refresh token issuance.
//!
//! Access tokens are stateless: the signature and `exp` claim are the whole
//! story. Refresh tokens are signed the same way but without a role, and are
//! additionally tracked according to the [`RefreshTokenPolicy`] the service
//! was built with.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::refresh_token::{ClientMetadata, NewRefreshToken, RefreshTokenStore};
use crate::error::{AuthError, AuthResult};
use crate::user::User;

pub mod claims;
pub mod policy;

pub use claims::{TokenClaims, TokenCodec};
pub use policy::{RefreshTokenPolicy, StatelessRefreshTokens, StoredRefreshTokens};

/// A signed token together with the instant it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenService {
    codec: TokenCodec,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    refresh_policy: Arc<dyn RefreshTokenPolicy>,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("codec", &self.codec)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("refresh_policy", &self.refresh_policy)
            .finish()
    }
}

impl TokenService {
    /// Service whose refresh tokens are validated like access tokens and
    /// never persisted.
    pub fn new(
        secret: impl AsRef<[u8]>,
        access_token_ttl: Duration,
        refresh_token_ttl: Duration,
    ) -> Self {
        Self::with_policy(
            secret,
            access_token_ttl,
            refresh_token_ttl,
            Arc::new(StatelessRefreshTokens),
        )
    }

    /// Service that persists every refresh token in `store` and consults it
    /// on validation.
    pub fn with_store(
        secret: impl AsRef<[u8]>,
        access_token_ttl: Duration,
        refresh_token_ttl: Duration,
        store: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        Self::with_policy(
            secret,
            access_token_ttl,
            refresh_token_ttl,
            Arc::new(StoredRefreshTokens::new(store)),
        )
    }

    pub fn with_policy(
        secret: impl AsRef<[u8]>,
        access_token_ttl: Duration,
        refresh_token_ttl: Duration,
        refresh_policy: Arc<dyn RefreshTokenPolicy>,
    ) -> Self {
        Self {
            codec: TokenCodec::new(secret),
            access_token_ttl,
            refresh_token_ttl,
            refresh_policy,
        }
    }

    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        self.refresh_token_ttl
    }

    pub fn is_stateful(&self) -> bool {
        self.refresh_policy.is_stateful()
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    fn expiry(now: DateTime<Utc>, ttl: Duration) -> AuthResult<DateTime<Utc>> {
        now.checked_add_signed(ttl)
            .ok_or_else(|| AuthError::system("token lifetime is out of range"))
    }

    /// Sign an access token for `user`.
    ///
    /// A zero or negative lifetime still yields a token; it simply fails
    /// validation as expired.
    pub fn generate_token(&self, user: &User) -> AuthResult<IssuedToken> {
        if user.id.is_empty() {
            return Err(AuthError::validation("user cannot be empty"));
        }

        let now = Utc::now();
        let expires_at = Self::expiry(now, self.access_token_ttl)?;
        let claims = TokenClaims {
            sub: user.id.clone(),
            user_id: user.id.clone(),
            role: Some(user.role.to_string()),
            perms: None,
            jti: None,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        Ok(IssuedToken {
            token: self.codec.sign(&claims)?,
            expires_at,
        })
    }

    /// Verify an access token and return the user id it carries.
    pub fn validate_token(&self, token: &str) -> AuthResult<String> {
        self.codec.validate(token)
    }

    pub async fn generate_refresh_token(&self, user_id: &str) -> AuthResult<IssuedToken> {
        self.generate_refresh_token_for(user_id, ClientMetadata::default())
            .await
    }

    /// Sign a refresh token and hand it to the refresh policy. When the
    /// policy fails to record it no token is returned.
    pub async fn generate_refresh_token_for(
        &self,
        user_id: &str,
        client: ClientMetadata,
    ) -> AuthResult<IssuedToken> {
        if user_id.is_empty() {
            return Err(AuthError::validation("user ID cannot be empty"));
        }

        let now = Utc::now();
        let expires_at = Self::expiry(now, self.refresh_token_ttl)?;
        let claims = TokenClaims {
            sub: user_id.to_string(),
            user_id: user_id.to_string(),
            role: None,
            perms: None,
            jti: Some(Uuid::new_v4().to_string()),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = self.codec.sign(&claims)?;

        self.refresh_policy
            .on_issued(
                NewRefreshToken::new(token.clone(), user_id, now, expires_at).with_client(client),
            )
            .await?;

        Ok(IssuedToken { token, expires_at })
    }

    pub async fn validate_refresh_token(&self, token: &str) -> AuthResult<String> {
        self.refresh_policy.validate(token, &self.codec).await
    }

    /// Revoke a refresh token if the policy keeps records. Unknown and
    /// already revoked tokens succeed.
    pub async fn revoke_refresh_token(&self, token: &str) -> AuthResult<()> {
        self.refresh_policy.revoke(token).await
    }

    /// The store refresh tokens are recorded in; `None` when stateless.
    pub fn refresh_token_store(&self) -> Option<&Arc<dyn RefreshTokenStore>> {
        self.refresh_policy.refresh_store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::refresh_token::InMemoryRefreshTokenStore;
    use crate::error::ErrorKind;
    use crate::user::UserRole;
    use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

    fn user(id: &str, role: UserRole) -> User {
        User::new(id, format!("{id}-name"), "$argon2id$hash", role).unwrap()
    }

    fn stateless() -> TokenService {
        TokenService::new("secret", Duration::minutes(15), Duration::hours(24))
    }

    fn stateful() -> (TokenService, Arc<InMemoryRefreshTokenStore>) {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let service = TokenService::with_store(
            "secret",
            Duration::minutes(15),
            Duration::hours(24),
            store.clone(),
        );
        (service, store)
    }

    #[test]
    fn issued_claims_decode_with_the_same_secret() {
        let service = stateless();
        let issued = service.generate_token(&user("u1", UserRole::Admin)).unwrap();

        let data = decode::<TokenClaims>(
            &issued.token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(data.claims.user_id, "u1");
        assert_eq!(data.claims.sub, "u1");
        assert_eq!(data.claims.role.as_deref(), Some("Admin"));
        assert_eq!(data.claims.exp, issued.expires_at.timestamp());

        assert_eq!(service.validate_token(&issued.token).unwrap(), "u1");
    }

    #[test]
    fn access_tokens_expire_after_the_configured_lifetime() {
        let service = stateless();
        let before = Utc::now();
        let issued = service.generate_token(&user("u1", UserRole::Tester)).unwrap();
        let after = Utc::now();

        assert!(issued.expires_at >= before + Duration::minutes(15));
        assert!(issued.expires_at <= after + Duration::minutes(15));
    }

    #[test]
    fn non_positive_lifetime_generates_but_never_validates() {
        for ttl in [Duration::zero(), Duration::seconds(-1)] {
            let service = TokenService::new("secret", ttl, Duration::hours(1));
            let issued = service.generate_token(&user("u1", UserRole::Tester)).unwrap();

            let err = service.validate_token(&issued.token).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unauthorized);
            assert!(err.to_string().contains("expired"));
        }
    }

    #[test]
    fn user_without_id_is_rejected() {
        let mut nobody = user("u1", UserRole::Tester);
        nobody.id.clear();
        let err = stateless().generate_token(&nobody).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn misconfigured_secret_is_a_system_error() {
        let service = TokenService::new("", Duration::minutes(15), Duration::hours(24));
        let err = service
            .generate_token(&user("u1", UserRole::Admin))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::System);
    }

    #[tokio::test]
    async fn refresh_tokens_carry_no_role() {
        let service = stateless();
        let issued = service.generate_refresh_token("u1").await.unwrap();

        let claims = service.codec().decode(&issued.token).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert!(claims.role.is_none());
        assert!(claims.jti.is_some());
    }

    #[tokio::test]
    async fn refresh_token_requires_a_user_id() {
        let (service, store) = stateful();
        let err = service.generate_refresh_token("").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn stateless_refresh_validates_by_signature() {
        let service = stateless();
        assert!(!service.is_stateful());

        let issued = service.generate_refresh_token("u1").await.unwrap();
        assert_eq!(service.validate_refresh_token(&issued.token).await.unwrap(), "u1");

        let err = service
            .validate_refresh_token("forged.token.value")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn stateful_refresh_persists_every_token() {
        let (service, store) = stateful();
        assert!(service.is_stateful());

        let first = service.generate_refresh_token("u1").await.unwrap();
        let second = service.generate_refresh_token("u1").await.unwrap();
        assert_ne!(first.token, second.token);

        let record = store.get_by_token(&first.token).await.unwrap();
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.expires_at, first.expires_at);
        assert_eq!(store.count("u1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stateful_refresh_records_client_metadata() {
        let (service, store) = stateful();
        let client = ClientMetadata {
            client_info: Some("cli/1.0".into()),
            ip: Some("10.0.0.7".into()),
        };

        let issued = service
            .generate_refresh_token_for("u1", client)
            .await
            .unwrap();
        let record = store.get_by_token(&issued.token).await.unwrap();
        assert_eq!(record.client_info.as_deref(), Some("cli/1.0"));
        assert_eq!(record.ip.as_deref(), Some("10.0.0.7"));
    }

    #[tokio::test]
    async fn stateful_validation_tracks_last_use() {
        let (service, store) = stateful();
        let issued = service.generate_refresh_token("u1").await.unwrap();

        assert_eq!(service.validate_refresh_token(&issued.token).await.unwrap(), "u1");
        let record = store.get_by_token(&issued.token).await.unwrap();
        assert!(record.last_used_at.is_some());
    }

    #[tokio::test]
    async fn revoked_refresh_token_is_unauthorized() {
        let (service, store) = stateful();
        let issued = service.generate_refresh_token("u1").await.unwrap();
        let record = store.get_by_token(&issued.token).await.unwrap();

        store.revoke(&record.id).await.unwrap();
        assert!(store.get_by_token(&issued.token).await.unwrap().is_revoked);

        let err = service
            .validate_refresh_token(&issued.token)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn expired_refresh_record_is_unauthorized() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let service = TokenService::with_store(
            "secret",
            Duration::minutes(15),
            Duration::seconds(-1),
            store,
        );
        let issued = service.generate_refresh_token("u1").await.unwrap();

        let err = service
            .validate_refresh_token(&issued.token)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn unknown_refresh_token_is_not_found() {
        let (service, _) = stateful();

        // Signed by us but never stored.
        let foreign = stateless().generate_refresh_token("u1").await.unwrap();
        let err = service
            .validate_refresh_token(&foreign.token)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = service.validate_refresh_token("").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn store_failure_fails_issuance() {
        let (service, store) = stateful();
        let issued = service.generate_refresh_token("u1").await.unwrap();

        // Re-recording an existing token string is rejected by the store.
        let duplicate = NewRefreshToken::new(
            issued.token.clone(),
            "u1",
            Utc::now(),
            issued.expires_at,
        );
        let err = StoredRefreshTokens::new(store.clone())
            .on_issued(duplicate)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::System);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn revoking_through_the_service_invalidates_the_record() {
        let (service, store) = stateful();
        let issued = service.generate_refresh_token("u1").await.unwrap();

        service.revoke_refresh_token(&issued.token).await.unwrap();
        service.revoke_refresh_token(&issued.token).await.unwrap();
        service.revoke_refresh_token("never-issued").await.unwrap();

        assert!(store.get_by_token(&issued.token).await.unwrap().is_revoked);
        let err = service
            .validate_refresh_token(&issued.token)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(service.refresh_token_store().is_some());
    }

    #[tokio::test]
    async fn stateless_revocation_is_a_no_op() {
        let service = stateless();
        let issued = service.generate_refresh_token("u1").await.unwrap();

        service.revoke_refresh_token(&issued.token).await.unwrap();
        assert_eq!(service.validate_refresh_token(&issued.token).await.unwrap(), "u1");
        assert!(service.refresh_token_store().is_none());
    }
}
