//! Admin authentication: JWT issue/verify, argon2 password hashing, and the
//! startup admin seeding.

pub mod middleware;

pub use middleware::{require_admin, AdminUser};

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::{ApiError, ApiResult};

/// JWT claims for admin sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Customer row id
    pub sub: i64,
    pub email: String,
    pub role: String,
    /// Expiry, seconds since epoch
    pub exp: i64,
}

/// Issues and verifies admin JWTs.
#[derive(Clone)]
pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_hours: i64,
}

impl JwtManager {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        }
    }

    pub fn generate_token(&self, id: i64, email: &str, role: &str) -> ApiResult<String> {
        let claims = Claims {
            sub: id,
            email: email.to_string(),
            role: role.to_string(),
            exp: OffsetDateTime::now_utc().unix_timestamp() + self.expiry_hours * 3600,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("failed to sign token: {}", e)))
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))
    }
}

/// Hash a password for storage.
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {}", e)))
}

/// Verify a password against a stored hash. Malformed hashes verify false.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Create the admin account from env config if it doesn't exist yet.
/// Returns whether a new account was created.
pub async fn seed_admin(pool: &PgPool, email: &str, password: &str) -> ApiResult<bool> {
    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM customers WHERE email = $1")
        .bind(meridian_billing::normalize_email(email))
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(false);
    }

    let hash = hash_password(password)?;
    sqlx::query(
        "INSERT INTO customers (email, first_name, role, password_hash) \
         VALUES ($1, 'Admin', 'admin', $2)",
    )
    .bind(meridian_billing::normalize_email(email))
    .bind(hash)
    .execute(pool)
    .await?;

    tracing::info!(email = %email, "Admin account created");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let jwt = JwtManager::new("test-secret", 24);
        let token = jwt.generate_token(7, "admin@example.com", "admin").unwrap();

        let claims = jwt.verify_token(&token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.email, "admin@example.com");
        assert_eq!(claims.role, "admin");
        assert!(claims.exp > OffsetDateTime::now_utc().unix_timestamp());
    }

    #[test]
    fn wrong_secret_rejected() {
        let issuer = JwtManager::new("secret-a", 24);
        let verifier = JwtManager::new("secret-b", 24);

        let token = issuer.generate_token(1, "a@b.c", "admin").unwrap();
        assert!(verifier.verify_token(&token).is_err());
    }

    #[test]
    fn garbage_token_rejected() {
        let jwt = JwtManager::new("test-secret", 24);
        assert!(jwt.verify_token("not.a.token").is_err());
        assert!(jwt.verify_token("").is_err());
    }

    #[test]
    fn role_is_preserved() {
        let jwt = JwtManager::new("test-secret", 24);
        let token = jwt.generate_token(3, "c@d.e", "customer").unwrap();
        let claims = jwt.verify_token(&token).unwrap();
        assert_eq!(claims.role, "customer");
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("hunter2-but-longer").unwrap();
        assert!(verify_password("hunter2-but-longer", &hash));
        assert!(!verify_password("hunter2-but-wrong", &hash));
    }

    #[test]
    fn malformed_hash_verifies_false() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }
}
