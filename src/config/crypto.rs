use argon2::password_hash::{PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHash, Version};
use rand::Rng;
use rand_core::OsRng;
use tracing::instrument;

use crate::errors::CryptoError;

/// Argon2id password hashing plus OTP code generation. Passwords are
/// the only thing hashed here; OTP codes are short-lived and stored as
/// plain fixed-length strings on their record.
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoService;

impl CryptoService {
    fn argon2() -> Result<Argon2<'static>, CryptoError> {
        let params = Params::new(
            32_768, // 32 MiB
            3,      // iterations
            1,      // parallelism
            None,
        )
        .map_err(|e| CryptoError::Params(e.to_string()))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    #[instrument(skip_all)]
    pub fn hash_password(&self, password: &str) -> Result<String, CryptoError> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Self::argon2()?;

        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| CryptoError::Hash(e.to_string()))?
            .to_string();

        Ok(hash)
    }

    #[instrument(skip_all)]
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, CryptoError> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|e| CryptoError::MalformedHash(e.to_string()))?;

        let argon2 = Self::argon2()?;

        match argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CryptoError::Verify(e.to_string())),
        }
    }

    /// Random numeric code of exactly `length` digits, leading zeros
    /// included. Uniqueness against previous codes is not a goal.
    pub fn generate_otp_code(&self, length: u32) -> String {
        // keeps 10^length inside u64
        let length = length.clamp(1, 18);
        let upper = 10u64.pow(length);
        let value = rand::thread_rng().gen_range(0..upper);
        format!("{value:0width$}", width = length as usize)
    }
}
