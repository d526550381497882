use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AppConfig, Env},
    error::ApiError,
    repository::RepositoryState,
};

/// Header accepted in `Env::Local` to impersonate an existing user without a token.
pub const DEV_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload of the HS256 session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): id of the user in the `users` table.
    pub sub: i64,
    /// Expiration Time (exp), seconds since the epoch. Always validated.
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

/// AuthUser
///
/// The resolved principal of an authenticated request. Handlers pass it to the
/// authorization guard; `Option<AuthUser>` is used on routes anonymous callers may hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub is_admin: bool,
}

/// extract_bearer
///
/// Returns the token of a `Bearer` Authorization header, if present.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// verify_token
///
/// Validates signature and expiry and returns the principal id carried in `sub`.
pub fn verify_token(token: &str, secret: &str) -> Result<i64, ApiError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims.sub)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected session token");
            ApiError::AuthenticationRequired
        })
}

/// issue_token
///
/// Signs a session token for `user_id`, valid for `ttl_hours`.
pub fn issue_token(user_id: i64, secret: &str, ttl_hours: i64) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(ttl_hours)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local`, an `x-user-id` header naming an existing user.
/// 2. Bearer token extraction and JWT validation.
/// 3. Database lookup, so tokens of deleted users stop working immediately.
///
/// Rejection: `ApiError::AuthenticationRequired` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get(DEV_USER_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| raw.parse::<i64>().ok());
            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await? {
                    return Ok(AuthUser {
                        id: user.id,
                        is_admin: user.is_admin,
                    });
                }
            }
        }

        let token = extract_bearer(&parts.headers).ok_or(ApiError::AuthenticationRequired)?;
        let user_id = verify_token(token, &config.jwt_secret)?;

        let user = repo
            .get_user(user_id)
            .await?
            .ok_or(ApiError::AuthenticationRequired)?;

        Ok(AuthUser {
            id: user.id,
            is_admin: user.is_admin,
        })
    }
}

/// Optional variant: anonymous when no credential is presented at all, rejected
/// when a credential is presented but invalid.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let has_credential = parts.headers.contains_key(header::AUTHORIZATION)
            || parts.headers.contains_key(DEV_USER_HEADER);
        if !has_credential {
            return Ok(None);
        }
        <AuthUser as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn bearer_scheme_is_required() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers), Some("abc.def"));
    }

    #[test]
    fn issued_token_round_trips_to_principal() {
        let token = issue_token(42, SECRET, 1).unwrap();
        assert_eq!(verify_token(&token, SECRET).unwrap(), 42);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(42, SECRET, 1).unwrap();
        assert!(matches!(
            verify_token(&token, "another-secret"),
            Err(ApiError::AuthenticationRequired)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token(42, SECRET, -2).unwrap();
        assert!(matches!(
            verify_token(&token, SECRET),
            Err(ApiError::AuthenticationRequired)
        ));
    }
}
