//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs issued by the identity service. Only access tokens
//! are accepted here; refresh tokens are rejected like malformed ones.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use common::UserId;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use purchase::Buyer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Account role carried in the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    VerifiedSeller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Verifies bearer tokens against a shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Decodes and validates `token`, accepting only unexpired access tokens.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation).map_err(
            |e| {
                tracing::debug!(error = %e, "rejected bearer token");
                ApiError::Unauthorized
            },
        )?;

        if data.claims.token_type != TokenType::Access {
            tracing::debug!("rejected non-access token");
            return Err(ApiError::Unauthorized);
        }
        Ok(data.claims)
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier").finish_non_exhaustive()
    }
}

/// The caller identified by a valid access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub email: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_verified_seller(&self) -> bool {
        self.role == Role::VerifiedSeller
    }

    /// The purchasing identity handed to the orchestrator.
    pub fn buyer(&self) -> Buyer {
        Buyer {
            id: self.id,
            email: self.email.clone(),
        }
    }
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: UserId::from_uuid(claims.sub),
            email: claims.email,
            role: claims.role,
        }
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        state.tokens.verify(token).map(AuthenticatedUser::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};

    const SECRET: &[u8] = b"test-secret";

    fn token(token_type: TokenType, exp_offset: i64) -> String {
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "seller@example.com".to_string(),
            role: Role::VerifiedSeller,
            token_type,
            exp: chrono::Utc::now().timestamp() + exp_offset,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    #[test]
    fn test_access_token_is_accepted() {
        let verifier = TokenVerifier::new(SECRET);
        let claims = verifier.verify(&token(TokenType::Access, 600)).unwrap();

        let user = AuthenticatedUser::from(claims);
        assert!(user.is_verified_seller());
        assert_eq!(user.buyer().email, "seller@example.com");
    }

    #[test]
    fn test_refresh_token_is_rejected() {
        let verifier = TokenVerifier::new(SECRET);
        let result = verifier.verify(&token(TokenType::Refresh, 600));
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let verifier = TokenVerifier::new(SECRET);
        let result = verifier.verify(&token(TokenType::Access, -3600));
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let verifier = TokenVerifier::new(b"another-secret");
        let result = verifier.verify(&token(TokenType::Access, 600));
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(
            serde_json::to_value(Role::VerifiedSeller).unwrap(),
            serde_json::json!("verified_seller")
        );
        let role: Role = serde_json::from_value(serde_json::json!("user")).unwrap();
        assert_eq!(role, Role::User);
    }
}
