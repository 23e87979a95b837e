//! Bearer-token verification and the `AuthUser` extractor.
//!
//! Tokens are issued elsewhere; this module only verifies them. A verified
//! token is reduced to a typed [`VerifiedIdentity`] so no claim map leaks
//! further into the service.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use uuid::Uuid;

use herald_common::error::AppError;

use crate::state::AppState;

/// Claims read from a bearer token. The subject is `userId`, falling back to `sub`.
#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(rename = "userId", default)]
    user_id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    exp: i64,
}

/// Result of a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Verifies HMAC-signed JWTs against a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = 0;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validate signature and expiry, and extract the subject.
    pub fn verify(&self, token: &str) -> Result<VerifiedIdentity, AppError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::Auth("token expired".to_string()),
                _ => AppError::Auth("invalid token".to_string()),
            }
        })?;

        let claims = data.claims;
        let subject = claims
            .user_id
            .or(claims.sub)
            .ok_or_else(|| AppError::Auth("invalid token payload".to_string()))?;
        let subject_id = Uuid::parse_str(&subject)
            .map_err(|_| AppError::Auth("invalid token payload".to_string()))?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AppError::Auth("invalid token payload".to_string()))?;

        Ok(VerifiedIdentity {
            subject_id,
            expires_at,
        })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Auth("missing authorization header".to_string()))?;

    let value = value
        .to_str()
        .map_err(|_| AppError::Auth("invalid authorization header format".to_string()))?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AppError::Auth(
            "invalid authorization header format".to_string(),
        )),
    }
}

/// Authenticated caller, extracted from the bearer token.
///
/// Use as an Axum extractor on protected routes:
/// ```ignore
/// async fn handler(auth: AuthUser) -> impl IntoResponse {
///     // auth.user_id is the verified subject
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub identity: VerifiedIdentity,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let result = bearer_token(&parts.headers).and_then(|token| state.verifier.verify(token));

        async move {
            let identity = result?;
            Ok(AuthUser {
                user_id: identity.subject_id,
                identity,
            })
        }
    }
}
