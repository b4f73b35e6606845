//! Bearer-token authentication.
//!
//! Tokens are issued by the external identity provider and signed with a
//! shared HS256 secret. The service only needs to know who the caller is, so
//! the only claim consumed is `sub` (the user's UUID).

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

/// The authenticated caller, extracted from `Authorization: Bearer <jwt>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    pub fn verify(&self, token: &str) -> Option<AuthUser> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Some(AuthUser {
                user_id: data.claims.sub,
            }),
            Err(e) => {
                debug!("Rejected bearer token: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthorized)?;
        state.verifier.verify(token).ok_or(AppError::Unauthorized)
    }
}

/// Mints a token the way the identity provider does. Used by tests.
#[cfg(test)]
pub fn issue_token(secret: &str, user_id: Uuid) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = Claims {
        sub: user_id,
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_valid_token() {
        let user_id = Uuid::new_v4();
        let token = issue_token("secret", user_id);
        let verifier = TokenVerifier::new("secret");
        assert_eq!(verifier.verify(&token), Some(AuthUser { user_id }));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let token = issue_token("secret", Uuid::new_v4());
        assert!(TokenVerifier::new("other").verify(&token).is_none());
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let claims = Claims {
            sub: Uuid::new_v4(),
            exp: (chrono::Utc::now() - chrono::Duration::hours(2)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(TokenVerifier::new("secret").verify(&token).is_none());
    }
}
