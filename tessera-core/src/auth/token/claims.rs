use std::fmt;

use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind as JwtErrorKind,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{AuthError, AuthResult};

/// Claim set carried by both access and refresh tokens.
///
/// `role` is only present on access tokens and `jti` only on refresh tokens.
/// `perms` is reserved and never populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies HMAC tokens with a single shared secret.
pub struct TokenCodec {
    secret: Zeroizing<Vec<u8>>,
    validation: Validation,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"<redacted>")
            .field("algorithms", &self.validation.algorithms)
            .finish()
    }
}

impl TokenCodec {
    const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

    /// Only the HMAC family verifies. Anything else, including `none` and
    /// asymmetric algorithms, is refused before the signature is checked.
    const ACCEPTED_ALGORITHMS: [Algorithm; 3] =
        [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Self::SIGNING_ALGORITHM);
        validation.algorithms = Self::ACCEPTED_ALGORITHMS.to_vec();
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            secret: Zeroizing::new(secret.as_ref().to_vec()),
            validation,
        }
    }

    pub fn sign(&self, claims: &TokenClaims) -> AuthResult<String> {
        if self.secret.is_empty() {
            return Err(AuthError::system(
                "failed to sign token: signing secret is empty",
            ));
        }

        encode(
            &Header::new(Self::SIGNING_ALGORITHM),
            claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| AuthError::system(format!("failed to sign token: {e}")))
    }

    /// Verify the signature and expiry and return the claims.
    ///
    /// Every failure is unauthorized. Expiry is reported as `token expired`;
    /// everything else as `failed to parse token`.
    pub fn decode(&self, token: &str) -> AuthResult<TokenClaims> {
        let data = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &self.validation,
        )
        .map_err(|e| match e.kind() {
            JwtErrorKind::ExpiredSignature => AuthError::unauthorized("token expired"),
            _ => {
                debug!(error = %e, "token rejected");
                AuthError::unauthorized("failed to parse token")
            }
        })?;

        // A token whose lifetime was zero or negative expires at issuance.
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::unauthorized("token expired"));
        }

        Ok(data.claims)
    }

    /// Stateless validation: verify the token and return the user it names.
    pub fn validate(&self, token: &str) -> AuthResult<String> {
        if token.is_empty() {
            return Err(AuthError::validation("token cannot be empty"));
        }

        let claims = self.decode(token)?;
        if claims.user_id.is_empty() {
            return Err(AuthError::unauthorized("invalid token: missing user ID"));
        }

        Ok(claims.user_id)
    }
}
