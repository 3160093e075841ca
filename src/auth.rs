//! JWT authentication.
//!
//! Tokens are issued elsewhere; this service only verifies them. A token is
//! accepted from `Authorization: Bearer <jwt>` or from the `auth_token` cookie.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
        HeaderMap,
    },
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::SubscriptionTier;

pub const AUTH_COOKIE: &str = "auth_token";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Opaque user id.
    pub sub: String,
    #[serde(default)]
    pub subscription: SubscriptionTier,
    pub exp: usize,
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub tier: SubscriptionTier,
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE)
        .map(|(_, value)| value)
        .filter(|t| !t.is_empty())
}

/// Bearer header first, then the auth cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Missing authentication token".to_string()))?;

        let claims = decode_token(token, &state.config.jwt_secret)?;

        Ok(AuthUser {
            user_id: claims.sub,
            tier: claims.subscription,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token(subscription: Option<&str>) -> String {
        let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
        let mut claims = serde_json::json!({ "sub": "user-1", "exp": exp });
        if let Some(tier) = subscription {
            claims["subscription"] = serde_json::json!(tier);
        }
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_defaults_to_free_tier() {
        let claims = decode_token(&token(None), SECRET).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.subscription, SubscriptionTier::Free);

        let premium = decode_token(&token(Some("premium")), SECRET).unwrap();
        assert_eq!(premium.subscription, SubscriptionTier::Premium);
    }

    #[test]
    fn test_decode_rejects_wrong_secret() {
        let err = decode_token(&token(None), "other-secret").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_token_from_header_or_cookie() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; auth_token=cookie-jwt"),
        );
        assert_eq!(extract_token(&headers), Some("cookie-jwt"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer header-jwt"));
        assert_eq!(extract_token(&headers), Some("header-jwt"));
    }
}
