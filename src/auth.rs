//! Password hashing and bearer tokens

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db;
use crate::entities::{NewUser, User};
use crate::error::{Error, Result};

const BAD_CREDENTIALS: &str = "Incorrect email or password";

pub struct PasswordService;

impl PasswordService {
    pub fn hash(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| Error::Auth(e.to_string()))
    }

    pub fn verify(password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Auth(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User email
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Response body of a successful login
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
}

pub struct TokenService {
    secret: String,
    expire_minutes: i64,
}

impl TokenService {
    pub fn new(secret: String, expire_minutes: i64) -> Self {
        Self {
            secret,
            expire_minutes,
        }
    }

    pub fn issue(&self, email: &str) -> Result<AccessToken> {
        let now = Utc::now();
        let claims = Claims {
            sub: email.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.expire_minutes)).timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| Error::Auth(e.to_string()))?;

        Ok(AccessToken {
            access_token: token,
            token_type: "bearer".to_string(),
        })
    }

    pub fn validate(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            debug!(error = %e, "token rejected");
            Error::Unauthorized("Could not validate credentials".to_string())
        })
    }

    /// Resolve a bearer token to the user it was issued for
    pub fn current_user(&self, conn: &Connection, token: &str) -> Result<User> {
        let claims = self.validate(token)?;
        db::get_user_by_email(conn, &claims.sub)?
            .ok_or_else(|| Error::Unauthorized("Could not validate credentials".to_string()))
    }
}

/// Hash the password and store the user
pub fn register(conn: &Connection, new_user: &NewUser) -> Result<User> {
    new_user.validate()?;
    let hashed = PasswordService::hash(&new_user.password)?;
    db::insert_user(conn, new_user, &hashed)
}

/// Check an email/password pair against the store
pub fn authenticate(conn: &Connection, email: &str, password: &str) -> Result<User> {
    let user = db::get_user_by_email(conn, email)?
        .ok_or_else(|| Error::Unauthorized(BAD_CREDENTIALS.to_string()))?;

    if !PasswordService::verify(password, &user.hashed_password)? {
        return Err(Error::Unauthorized(BAD_CREDENTIALS.to_string()));
    }

    Ok(user)
}
