//! Bearer-token verification against the identity provider's signing keys.

use std::time::Duration;

use axum::http::{header, HeaderMap};
use jsonwebtoken::{
    decode, decode_header,
    jwk::{Jwk, JwkSet},
    Algorithm, DecodingKey, Header, Validation,
};
use serde_json::Value;
use server_api::AuthedUser;
use shared::{domain::UserId, protocol::jwks_candidate_urls};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Settings;

const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingBearer,
    #[error("token header is missing kid")]
    MissingKid,
    #[error("invalid kid")]
    UnknownKid,
    #[error("failed to fetch JWKS: {0}")]
    Jwks(String),
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token subject is not a user id")]
    InvalidSubject,
}

pub struct JwtVerifier {
    http: reqwest::Client,
    audience: String,
    issuer: String,
    secret: Option<String>,
    anon_key: Option<String>,
    jwks_candidates: Vec<String>,
    jwks_cache: RwLock<Option<JwkSet>>,
}

impl JwtVerifier {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            audience: settings.jwt_audience.clone(),
            issuer: settings.jwt_issuer.clone(),
            secret: settings.jwt_secret.clone(),
            anon_key: Some(settings.supabase_anon_key.clone()).filter(|k| !k.is_empty()),
            jwks_candidates: jwks_candidate_urls(
                &settings.supabase_url,
                Some(settings.jwks_url.as_str()),
            ),
            jwks_cache: RwLock::new(None),
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthedUser, AuthError> {
        let token = bearer_token(headers)?;
        self.verify(token).await
    }

    pub async fn verify(&self, token: &str) -> Result<AuthedUser, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let key = self.decoding_key(&header).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);

        let claims = decode::<Value>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?
            .claims;
        authed_user_from_claims(claims)
    }

    async fn decoding_key(&self, header: &Header) -> Result<DecodingKey, AuthError> {
        if let Some(secret) = &self.secret {
            if !matches!(
                header.alg,
                Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
            ) {
                return Err(AuthError::InvalidToken(format!(
                    "unsupported algorithm {:?} for shared-secret verification",
                    header.alg
                )));
            }
            return Ok(DecodingKey::from_secret(secret.as_bytes()));
        }

        let kid = header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(AuthError::MissingKid)?;
        let jwk = self.find_jwk(kid).await?;
        DecodingKey::from_jwk(&jwk).map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    async fn find_jwk(&self, kid: &str) -> Result<Jwk, AuthError> {
        if let Some(cached) = self.jwks_cache.read().await.as_ref() {
            if let Some(jwk) = cached.find(kid) {
                return Ok(jwk.clone());
            }
        }

        let fresh = self.fetch_jwks().await?;
        let found = fresh.find(kid).cloned();
        *self.jwks_cache.write().await = Some(fresh);
        found.ok_or(AuthError::UnknownKid)
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        let mut last_error = None;
        for url in &self.jwks_candidates {
            let mut request = self.http.get(url).timeout(JWKS_FETCH_TIMEOUT);
            if let Some(anon_key) = &self.anon_key {
                request = request.header("apikey", anon_key);
            }
            let result = async {
                request
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<JwkSet>()
                    .await
            }
            .await;
            match result {
                Ok(set) => {
                    info!(%url, keys = set.keys.len(), "JWKS fetched");
                    return Ok(set);
                }
                Err(error) => {
                    warn!(%url, %error, "JWKS fetch failed");
                    last_error = Some(error.to_string());
                }
            }
        }
        Err(AuthError::Jwks(
            last_error.unwrap_or_else(|| "no JWKS location configured".to_string()),
        ))
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingBearer)?;
    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MissingBearer)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AuthError::MissingBearer);
    }
    Ok(token.trim())
}

fn authed_user_from_claims(claims: Value) -> Result<AuthedUser, AuthError> {
    let user_id = claims
        .get("sub")
        .and_then(Value::as_str)
        .and_then(|sub| Uuid::parse_str(sub).ok())
        .map(UserId)
        .ok_or(AuthError::InvalidSubject)?;
    let email = claims
        .get("email")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let provider = claims
        .pointer("/app_metadata/provider")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(AuthedUser {
        user_id,
        email,
        provider,
        claims,
    })
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
