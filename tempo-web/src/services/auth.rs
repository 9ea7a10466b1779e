use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::user::User;

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// User accounts: argon2 password hashing, bearer-token issue/verify,
/// and the synchronous user read/write path (which bypasses the async
/// storage queue; account consistency matters, game history does not).
pub struct AuthService {
    pool: Option<DbPool>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    /// Verified against on lookup failure so "no such user" and "wrong
    /// password" take the same time.
    dummy_hash: String,
}

impl AuthService {
    pub fn new(pool: Option<DbPool>, secret: &str) -> AuthService {
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = Argon2::default()
            .hash_password(b"timing-equalizer", &salt)
            .expect("argon2 accepts any input")
            .to_string();
        AuthService {
            pool,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            dummy_hash,
        }
    }

    fn db(&self) -> Result<&DbPool, AppError> {
        self.pool.as_ref().ok_or_else(|| {
            AppError::InvalidRequest("user accounts require persistent storage".to_string())
        })
    }

    pub fn issue_token(&self, user_id: &str) -> Result<(String, DateTime<Utc>), AppError> {
        let now = Utc::now();
        let expires_at = now + Duration::hours(TOKEN_TTL_HOURS);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token encode error: {e}")))?;
        Ok((token, expires_at))
    }

    pub fn validate_token(&self, token: &str) -> Result<String, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AppError::Unauthorized("invalid or expired token".to_string()))?;
        Ok(data.claims.sub)
    }

    pub async fn register(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
    ) -> Result<(User, String, DateTime<Utc>), AppError> {
        let username = username.trim();
        if !valid_username(username) {
            return Err(AppError::InvalidRequest(
                "username must be 1-40 characters of letters, digits, or underscore".to_string(),
            ));
        }
        if !valid_password(password) {
            return Err(AppError::InvalidRequest(
                "password must be 8-128 characters with at least one letter and one digit"
                    .to_string(),
            ));
        }
        let email = email.map(str::trim).filter(|e| !e.is_empty());
        if let Some(e) = email
            && !valid_email(e)
        {
            return Err(AppError::InvalidRequest("invalid email address".to_string()));
        }

        let pool = self.db()?;
        let hash = self.hash_password(password)?;
        let user_id = Uuid::new_v4().to_string();
        let user = match User::create(pool, &user_id, username, email, &hash).await {
            Ok(user) => user,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AppError::Conflict(
                    "username or email is already taken".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(user = %user.username, "user registered");
        let (token, expires_at) = self.issue_token(&user.user_id)?;
        Ok((user, token, expires_at))
    }

    /// Constant-response login: every failure is the same `unauthorized`,
    /// and a missing user still burns a hash verification.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<(User, String, DateTime<Utc>), AppError> {
        let pool = self.db()?;
        let Some(user) = User::find_by_identifier(pool, identifier.trim()).await? else {
            let _ = self.verify_password(password, &self.dummy_hash);
            return Err(AppError::Unauthorized("invalid credentials".to_string()));
        };
        if !self.verify_password(password, &user.password_hash) {
            return Err(AppError::Unauthorized("invalid credentials".to_string()));
        }

        if let Err(e) = User::update_last_login(pool, &user.user_id).await {
            tracing::warn!("failed to record last login: {e}");
        }
        let (token, expires_at) = self.issue_token(&user.user_id)?;
        Ok((user, token, expires_at))
    }

    pub async fn me(&self, user_id: &str) -> Result<User, AppError> {
        let pool = self.db()?;
        User::find_by_id(pool, user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("unknown user".to_string()))
    }

    fn hash_password(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("password hash error: {e}")))?
            .to_string())
    }

    fn verify_password(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

fn valid_username(username: &str) -> bool {
    (1..=40).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn valid_password(password: &str) -> bool {
    (8..=128).contains(&password.len())
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
}

fn valid_email(email: &str) -> bool {
    email.len() <= 254
        && !email.contains(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
}
