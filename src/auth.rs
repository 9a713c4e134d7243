use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use log::debug;
use rand_core::OsRng;
use rocket::{
    http::Status,
    request::{FromRequest, Outcome, Request},
    serde::{Deserialize, Serialize},
};

use crate::{config::AppConfig, ids::UserId, user, ApiError, Result};

const BEARER: &str = "Bearer ";
const AUTHORIZATION: &str = "Authorization";

// Used when decoding a token to `AuthenticatedUser`
#[derive(Debug)]
pub enum AuthenticationError {
    Missing,
    Decoding(String),
    Expired,
    Misconfigured,
}

/// Claims carried by a session token. `sub` is the user's id, `name` their
/// display name at login time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct AuthenticatedUser {
    sub: UserId,
    pub name: String,
    exp: usize,
}

impl AuthenticatedUser {
    pub fn from_user(user: &user::User) -> Self {
        Self {
            sub: user.id.clone(),
            name: user.name.clone(),
            exp: 0,
        }
    }

    pub fn id(&self) -> &UserId {
        &self.sub
    }

    /// Create a `AuthenticatedUser` from a 'Bearer <token>' value
    fn from_authorization(value: &str, secret: &str) -> Result<Self, AuthenticationError> {
        let token = value
            .strip_prefix(BEARER)
            .ok_or(AuthenticationError::Missing)?;

        // The default validation checks the signature and the exp claim
        let token = decode::<AuthenticatedUser>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthenticationError::Expired,
            _ => AuthenticationError::Decoding(e.to_string()),
        })?;

        Ok(token.claims)
    }

    /// Converts these claims into a signed token string
    pub fn to_token(mut self, config: &AppConfig) -> Result<String> {
        let expiration = Utc::now()
            .checked_add_signed(Duration::hours(config.token_ttl_hours))
            .ok_or_else(|| ApiError::Internal("failed to create an expiration time".into()))?
            .timestamp();

        self.exp = expiration as usize;

        encode(
            &Header::default(),
            &self,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .map_err(|e| ApiError::Internal(e.to_string()))
    }
}

/// Identity of the caller for routes that also serve anonymous requests.
/// A token that fails to decode leaves the caller a guest.
pub enum Caller {
    Authenticated(AuthenticatedUser),
    Guest,
}

impl Caller {
    pub fn id(&self) -> Option<&UserId> {
        match self {
            Caller::Authenticated(user) => Some(user.id()),
            Caller::Guest => None,
        }
    }
}

fn secret<'r>(request: &'r Request<'_>) -> Option<&'r str> {
    request
        .rocket()
        .state::<AppConfig>()
        .map(|config| config.jwt_secret.as_str())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = AuthenticationError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(secret) = secret(request) else {
            return Outcome::Error((Status::InternalServerError, AuthenticationError::Misconfigured));
        };
        match request.headers().get_one(AUTHORIZATION) {
            None => Outcome::Error((Status::Unauthorized, AuthenticationError::Missing)),
            Some(value) => match AuthenticatedUser::from_authorization(value, secret) {
                Err(e) => {
                    debug!("Rejected token: {:?}", e);
                    Outcome::Error((Status::Forbidden, e))
                }
                Ok(claims) => Outcome::Success(claims),
            },
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = AuthenticationError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(secret) = secret(request) else {
            return Outcome::Error((Status::InternalServerError, AuthenticationError::Misconfigured));
        };
        match request.headers().get_one(AUTHORIZATION) {
            None => Outcome::Success(Caller::Guest),
            Some(value) => match AuthenticatedUser::from_authorization(value, secret) {
                Err(e) => {
                    debug!("Treating caller with unusable token as a guest: {:?}", e);
                    Outcome::Success(Caller::Guest)
                }
                Ok(claims) => Outcome::Success(Caller::Authenticated(claims)),
            },
        }
    }
}

/// Hashes to a PHC string ($argon2id$v=19$...) with a fresh salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("could not hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let hash = PasswordHash::new(hash)
        .map_err(|e| ApiError::Internal(format!("stored password hash is invalid: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::{ChatConfig, ImageHostConfig};

    fn config(secret: &str, ttl: i64) -> AppConfig {
        AppConfig {
            jwt_secret: secret.to_string(),
            token_ttl_hours: ttl,
            static_dir: PathBuf::from("dist"),
            chat: ChatConfig::default(),
            image_host: ImageHostConfig::default(),
        }
    }

    fn claims() -> AuthenticatedUser {
        AuthenticatedUser {
            sub: UserId::from("u1"),
            name: "Ada".to_string(),
            exp: 0,
        }
    }

    #[test]
    fn token_is_accepted_with_the_signing_secret() {
        let token = claims().to_token(&config("s3cret", 1)).unwrap();
        let decoded =
            AuthenticatedUser::from_authorization(&format!("Bearer {token}"), "s3cret").unwrap();
        assert_eq!(decoded.id(), &UserId::from("u1"));
        assert_eq!(decoded.name, "Ada");
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = claims().to_token(&config("s3cret", 1)).unwrap();
        let result = AuthenticatedUser::from_authorization(&format!("Bearer {token}"), "other");
        assert!(matches!(result, Err(AuthenticationError::Decoding(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = claims().to_token(&config("s3cret", -2)).unwrap();
        let result = AuthenticatedUser::from_authorization(&format!("Bearer {token}"), "s3cret");
        assert!(matches!(result, Err(AuthenticationError::Expired)));
    }

    #[test]
    fn header_without_bearer_prefix_is_missing() {
        let result = AuthenticatedUser::from_authorization("Token abc", "s3cret");
        assert!(matches!(result, Err(AuthenticationError::Missing)));
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
    }
}
