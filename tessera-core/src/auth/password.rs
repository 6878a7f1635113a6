use std::fmt;

use argon2::{
    Algorithm, Argon2, Params, ParamsBuilder, Version,
    password_hash::{
        Error as PasswordHashError, PasswordHash, PasswordHasher as _, PasswordVerifier as _,
        SaltString,
    },
};
use rand::{TryRngCore, rngs::OsRng};
use zeroize::Zeroizing;

use crate::error::{AuthError, AuthResult};

/// Salts and hashes credentials, and checks candidates against stored hashes.
pub trait PasswordHasher: Send + Sync + fmt::Debug {
    /// Produce a freshly salted hash. Hashing the same password twice never
    /// yields the same output.
    fn hash_password(&self, password: &str) -> AuthResult<String>;

    /// `Ok(())` when `password` matches `hash`.
    ///
    /// Empty inputs are a validation error, a mismatch is unauthorized and a
    /// hash that cannot be parsed is a system error.
    fn verify_password(&self, password: &str, hash: &str) -> AuthResult<()>;
}

/// Argon2id implementation of [`PasswordHasher`].
///
/// The configured cost is the Argon2 iteration count. Values outside
/// `MIN_COST..=MAX_COST` fall back to `DEFAULT_COST` instead of failing.
pub struct Argon2PasswordHasher {
    argon2: Argon2<'static>,
    pepper: Option<Zeroizing<Vec<u8>>>,
}

impl fmt::Debug for Argon2PasswordHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argon2PasswordHasher")
            .field("params", self.argon2.params())
            .field("peppered", &self.pepper.is_some())
            .finish()
    }
}

impl Default for Argon2PasswordHasher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COST)
    }
}

impl Argon2PasswordHasher {
    pub const MIN_COST: u32 = 1;
    pub const MAX_COST: u32 = 10;
    pub const DEFAULT_COST: u32 = 3;

    /// 19 MiB, the OWASP baseline for Argon2id.
    const MEMORY_KIB: u32 = 19 * 1024;
    const PARALLELISM: u32 = 1;
    const OUTPUT_LEN: usize = 32;
    const SALT_LENGTH: usize = argon2::password_hash::Salt::RECOMMENDED_LENGTH;

    pub fn new(cost: u32) -> Self {
        let cost = Self::clamp_cost(cost);
        let params = ParamsBuilder::new()
            .m_cost(Self::MEMORY_KIB)
            .t_cost(cost)
            .p_cost(Self::PARALLELISM)
            .output_len(Self::OUTPUT_LEN)
            .build()
            .unwrap_or_default();

        Self::with_params(params)
    }

    /// Build a hasher with caller-specified Argon2 parameters (useful for
    /// tests or constrained environments).
    pub fn with_params(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::default(), params),
            pepper: None,
        }
    }

    /// Append a server-side secret to every password before hashing.
    pub fn with_pepper(mut self, pepper: impl AsRef<[u8]>) -> Self {
        let pepper = pepper.as_ref();
        self.pepper = (!pepper.is_empty()).then(|| Zeroizing::new(pepper.to_vec()));
        self
    }

    pub fn cost(&self) -> u32 {
        self.argon2.params().t_cost()
    }

    fn clamp_cost(cost: u32) -> u32 {
        if (Self::MIN_COST..=Self::MAX_COST).contains(&cost) {
            cost
        } else {
            Self::DEFAULT_COST
        }
    }

    fn material(&self, password: &str) -> Zeroizing<Vec<u8>> {
        let pepper = self.pepper.as_deref().map(Vec::as_slice).unwrap_or_default();
        let mut material = Zeroizing::new(Vec::with_capacity(password.len() + pepper.len()));
        material.extend_from_slice(password.as_bytes());
        material.extend_from_slice(pepper);
        material
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash_password(&self, password: &str) -> AuthResult<String> {
        if password.is_empty() {
            return Err(AuthError::validation("password cannot be empty"));
        }

        let mut salt_bytes = [0u8; Self::SALT_LENGTH];
        OsRng
            .try_fill_bytes(&mut salt_bytes)
            .map_err(|e| AuthError::system(format!("failed to generate password salt: {e}")))?;
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AuthError::system(format!("failed to encode password salt: {e}")))?;

        let material = self.material(password);
        let hash = self
            .argon2
            .hash_password(&material, &salt)
            .map_err(|e| AuthError::system(format!("failed to hash password: {e}")))?;

        Ok(hash.to_string())
    }

    fn verify_password(&self, password: &str, hash: &str) -> AuthResult<()> {
        if password.is_empty() {
            return Err(AuthError::validation("password cannot be empty"));
        }
        if hash.is_empty() {
            return Err(AuthError::validation("hash cannot be empty"));
        }

        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::system(format!("failed to verify password: {e}")))?;

        let material = self.material(password);
        match self.argon2.verify_password(&material, &parsed) {
            Ok(()) => Ok(()),
            Err(PasswordHashError::Password) => {
                Err(AuthError::unauthorized("password does not match"))
            }
            Err(e) => Err(AuthError::system(format!("failed to verify password: {e}"))),
        }
    }
}
