//! JWT Authentication Module
//!
//! Bearer tokens are HS256 JWTs carrying the user id (`sub`), role and expiry.
//! Handlers take an `AuthUser` argument to require a valid token.

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::AppState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("You are not logged in. Please log in to get access")]
    MissingToken,
    #[error("Invalid token. Please log in again")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("Failed to sign token: {0}")]
    Encode(jsonwebtoken::errors::Error),
}

#[derive(Debug, Error)]
#[error("Unknown role '{0}'")]
pub struct UnknownRole(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Instructor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Instructor => "instructor",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "instructor" => Ok(Self::Instructor),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Signing and verification keys derived from the configured secret
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    expires_in: Duration,
}

impl JwtKeys {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            expires_in: Duration::hours(config.jwt_expires_in_hours),
        }
    }

    /// Sign a token valid for the configured lifetime
    pub fn issue(&self, user_id: Uuid, role: Role) -> Result<String, AuthError> {
        self.issue_for(user_id, role, self.expires_in)
    }

    pub fn issue_for(&self, user_id: Uuid, role: Role, lifetime: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AuthError::Encode)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(AuthError::InvalidToken)
    }
}

/// The authenticated caller, extracted from the `Authorization: Bearer` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// 403 unless the caller has one of the given roles
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::forbidden(
                "You do not have permission to perform this action",
            ))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;
        let claims = state.jwt.verify(token).map_err(|e| {
            debug!("Rejected token: {}", e);
            e
        })?;

        Ok(Self {
            id: claims.sub,
            role: claims.role,
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(secret: &str) -> JwtKeys {
        JwtKeys::new(&AuthConfig {
            jwt_secret: secret.to_string(),
            jwt_expires_in_hours: 24,
        })
    }

    #[test]
    fn test_token_round_trip() {
        let keys = keys("test-secret");
        let user = Uuid::new_v4();
        let token = keys.issue(user, Role::Instructor).unwrap();

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.role, Role::Instructor);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_rejects_wrong_secret_and_expired() {
        let token = keys("one").issue(Uuid::new_v4(), Role::User).unwrap();
        assert!(matches!(keys("two").verify(&token), Err(AuthError::InvalidToken(_))));

        let keys = keys("one");
        let expired = keys
            .issue_for(Uuid::new_v4(), Role::User, Duration::hours(-2))
            .unwrap();
        assert!(keys.verify(&expired).is_err());
        assert!(keys.verify("not-a-jwt").is_err());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("superuser".parse::<Role>().is_err());
        assert_eq!(Role::try_from("instructor".to_string()).unwrap(), Role::Instructor);
    }

    #[test]
    fn test_require_role() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            role: Role::User,
        };
        assert!(user.require_role(&[Role::Instructor, Role::Admin]).is_err());
        assert!(user.require_role(&[Role::User]).is_ok());
        assert!(!user.is_admin());
    }
}
