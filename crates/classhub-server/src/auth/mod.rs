use crate::error::{AppError, Result};
use crate::models::{Identity, Role, UserRef};
use crate::state::AppState;
use axum::{RequestPartsExt, extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Access token claims. Tokens are issued by the account service; `create_token`
/// exists for tooling and tests.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64, // User ID
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
}

impl Claims {
    pub fn new(user: &UserRef, role: Role, expires_in_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role,
            exp: (now + Duration::hours(expires_in_hours)).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Resolves the caller category once, at the authentication boundary.
    pub fn identity(&self) -> Identity {
        Identity::new(
            self.role,
            UserRef {
                id: self.sub,
                username: self.username.clone(),
                email: self.email.clone(),
            },
        )
    }
}

pub fn create_token(user: &UserRef, role: Role, secret: &str) -> Result<String> {
    let claims = Claims::new(user, role, 24 * 7); // 7 days

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Extractor for authenticated requests
pub struct AuthUser(pub Identity);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let claims = verify_token(bearer.token(), &state.config.jwt_secret)?;

        Ok(AuthUser(claims.identity()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserRef {
        UserRef {
            id: 9,
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
        }
    }

    #[test]
    fn test_token_round_trip_resolves_identity() {
        let token = create_token(&user(), Role::Student, "secret").unwrap();
        let claims = verify_token(&token, "secret").unwrap();

        assert_eq!(claims.identity(), Identity::Student(user()));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = create_token(&user(), Role::Tutor, "secret").unwrap();
        assert!(matches!(
            verify_token(&token, "other"),
            Err(AppError::Jwt(_))
        ));
    }
}
