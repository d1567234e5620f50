use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use std::convert::Infallible;
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    gate::{DenyReason, Principal},
    repository::RepositoryState,
};

/// Claims
///
/// Payload of the bearer tokens issued by the external identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's UUID, the key into the `users` table.
    pub sub: Uuid,
    /// Expiration Time (exp): tokens past this instant are rejected.
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

/// AuthError
///
/// Why no principal could be resolved. The gate never sees these: every
/// variant is normalized to an absent identity before the access check.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credentials presented")]
    MissingCredentials,
    #[error("token expired")]
    Expired,
    #[error("token rejected: {0}")]
    InvalidToken(String),
    #[error("user {0} not found")]
    UnknownUser(Uuid),
    #[error("identity store unavailable: {0}")]
    Store(#[from] sqlx::Error),
}

/// resolve_principal
///
/// Looks up the identity behind a request and loads its role/permission
/// snapshot.
///
/// 1. Local bypass: in `Env::Local` an `x-user-id` header naming an existing
///    user is accepted without a token.
/// 2. Bearer token: `Authorization: Bearer <jwt>`, HS256 with the configured
///    secret, `exp` enforced.
/// 3. The token subject must still exist in the store.
pub async fn resolve_principal(
    parts: &Parts,
    repo: &RepositoryState,
    config: &AppConfig,
) -> Result<Principal, AuthError> {
    if config.env == Env::Local {
        let bypass_id = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|id_str| Uuid::parse_str(id_str).ok());

        if let Some(user_id) = bypass_id {
            match repo.load_principal(user_id).await {
                Ok(Some(principal)) => return Ok(principal),
                Ok(None) => tracing::debug!(%user_id, "bypass user not found"),
                Err(e) => tracing::debug!(%user_id, "bypass lookup failed: {}", e),
            }
        }
        // A bad, unknown or unloadable bypass header falls through to token
        // validation.
    }

    let token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingCredentials)?;

    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::InvalidToken(e.to_string()),
    })?;

    let user_id = token_data.claims.sub;

    // Users deleted after the token was issued are no longer signed in.
    repo.load_principal(user_id)
        .await?
        .ok_or(AuthError::UnknownUser(user_id))
}

/// AuthUser
///
/// Extractor for handlers behind an `Authenticated`, role or permission
/// requirement. The gate middleware has usually resolved the principal
/// already and left it in the request extensions; otherwise it is resolved
/// here.
///
/// Rejection: `DenyReason::Unauthenticated` (401).
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = DenyReason;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(AuthUser(principal.clone()));
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        match resolve_principal(parts, &repo, &config).await {
            Ok(principal) => Ok(AuthUser(principal)),
            Err(e) => {
                tracing::debug!("identity lookup failed: {}", e);
                Err(DenyReason::Unauthenticated)
            }
        }
    }
}

/// `Option<AuthUser>` for public handlers that only personalize their output.
/// The gate does not resolve identities on public routes, so the lookup
/// happens here and only for handlers that ask for it. Any failure reads as
/// an anonymous visitor.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(<AuthUser as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .ok())
    }
}
