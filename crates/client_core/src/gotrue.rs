//! Session provider backed by a Supabase-style GoTrue auth server.
//!
//! Sign-in uses the implicit OAuth flow: the authorize URL is handed to a
//! [`SignInLauncher`] (a browser, or a terminal that prints it), and the
//! provider later redirects back with the tokens in the URL fragment, which
//! [`GoTrueSessionProvider::restore_from_redirect`] turns into a [`Session`].

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use shared::protocol::auth_base_url;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
pub use url::Url;

use crate::{
    config::ClientConfig,
    error::ProviderError,
    session::{IdentityClaims, Session, SessionProvider, SignInOptions},
};

/// Opens the provider's authorize page for the user.
pub trait SignInLauncher: Send + Sync {
    fn launch(&self, provider_id: &str, authorize_url: &Url) -> Result<(), ProviderError>;
}

/// Logs the authorize URL; used when no interactive front end is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLauncher;

impl SignInLauncher for LogLauncher {
    fn launch(&self, provider_id: &str, authorize_url: &Url) -> Result<(), ProviderError> {
        info!(provider = provider_id, url = %authorize_url, "open this URL to sign in");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct AuthSettings {
    #[serde(default)]
    external: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    app_metadata: AppMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct AppMetadata {
    #[serde(default)]
    provider: Option<String>,
}

pub struct GoTrueSessionProvider {
    http: Client,
    auth_url: String,
    anon_key: String,
    launcher: Arc<dyn SignInLauncher>,
    session: RwLock<Option<Session>>,
}

impl GoTrueSessionProvider {
    pub fn new(provider_url: &str, anon_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            auth_url: auth_base_url(provider_url),
            anon_key: anon_key.into(),
            launcher: Arc::new(LogLauncher),
            session: RwLock::new(None),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.provider_url, config.provider_anon_key.clone())
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn SignInLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn authorize_url(&self, provider_id: &str, redirect_to: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&format!("{}/authorize", self.auth_url))
            .map_err(|e| ProviderError::new(format!("invalid auth url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("provider", provider_id)
            .append_pair("redirect_to", redirect_to);
        Ok(url)
    }

    /// Seeds the session from a raw access token, e.g. one passed on the
    /// command line. Identity and expiry come from the token's claims.
    pub async fn with_access_token(&self, access_token: &str) -> Result<Session, ProviderError> {
        let (identity_claims, exp) = decode_claims(access_token)?;
        let session = Session {
            access_token: access_token.to_string(),
            identity_claims,
            expires_at: exp.and_then(|exp| DateTime::from_timestamp(exp, 0)),
        };
        self.store(session.clone()).await;
        Ok(session)
    }

    /// Completes the implicit flow from the URL the provider redirected to.
    pub async fn restore_from_redirect(&self, redirect_url: &str) -> Result<Session, ProviderError> {
        let url = Url::parse(redirect_url)
            .map_err(|e| ProviderError::new(format!("invalid redirect url: {e}")))?;
        let fragment = url.fragment().unwrap_or_default();
        let params: HashMap<String, String> = url::form_urlencoded::parse(fragment.as_bytes())
            .into_owned()
            .collect();

        if let Some(description) = params
            .get("error_description")
            .or_else(|| params.get("error"))
        {
            return Err(ProviderError::new(description.clone()));
        }
        let access_token = params
            .get("access_token")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ProviderError::new("redirect carried no access token"))?;

        let (identity_claims, exp) = decode_claims(access_token)?;
        let expires_at = match params.get("expires_in").and_then(|v| v.parse::<i64>().ok()) {
            Some(seconds) => Some(
                Duration::try_seconds(seconds)
                    .and_then(|ttl| Utc::now().checked_add_signed(ttl))
                    .ok_or_else(|| ProviderError::new(format!("invalid expires_in: {seconds}")))?,
            ),
            None => exp.and_then(|exp| DateTime::from_timestamp(exp, 0)),
        };
        let session = Session {
            access_token: access_token.clone(),
            identity_claims,
            expires_at,
        };
        self.store(session.clone()).await;
        Ok(session)
    }

    async fn store(&self, session: Session) {
        info!(
            user_id = %session.identity_claims.user_id,
            provider = %session.identity_claims.provider,
            "session established"
        );
        *self.session.write().await = Some(session);
    }

    async fn ensure_provider_enabled(&self, provider_id: &str) -> Result<(), ProviderError> {
        let res = self
            .http
            .get(format!("{}/settings", self.auth_url))
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("auth settings request failed: {e}")))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ProviderError::new(format!("{} {body}", status.as_u16())));
        }
        let settings: AuthSettings = res
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("invalid auth settings: {e}")))?;
        let enabled = settings
            .external
            .get(provider_id)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if enabled {
            Ok(())
        } else {
            Err(ProviderError::new(format!(
                "provider {provider_id} is not enabled"
            )))
        }
    }
}

#[async_trait]
impl SessionProvider for GoTrueSessionProvider {
    async fn get_current_session(&self) -> Result<Option<Session>, ProviderError> {
        let session = self.session.read().await.clone();
        match session {
            Some(session) if session.is_expired_at(Utc::now()) => {
                debug!("held session has expired");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn sign_in_with_provider(
        &self,
        provider_id: &str,
        options: &SignInOptions,
    ) -> Result<(), ProviderError> {
        self.ensure_provider_enabled(provider_id).await?;
        let url = self.authorize_url(provider_id, &options.redirect_to)?;
        self.launcher.launch(provider_id, &url)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };
        let res = self
            .http
            .post(format!("{}/logout", self.auth_url))
            .bearer_auth(&session.access_token)
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("logout request failed: {e}")))?;
        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        let body = res.text().await.unwrap_or_default();
        warn!(%status, "provider rejected logout");
        Err(ProviderError::new(format!("{} {body}", status.as_u16())))
    }
}

fn decode_claims(access_token: &str) -> Result<(IdentityClaims, Option<i64>), ProviderError> {
    let payload = access_token
        .split('.')
        .nth(1)
        .ok_or_else(|| ProviderError::new("access token is not a JWT"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ProviderError::new(format!("access token payload is not base64: {e}")))?;
    let payload: TokenPayload = serde_json::from_slice(&bytes)
        .map_err(|e| ProviderError::new(format!("access token payload is invalid: {e}")))?;
    let claims = IdentityClaims {
        provider: payload.app_metadata.provider.unwrap_or_default(),
        user_id: payload.sub,
        email: payload.email,
    };
    Ok((claims, payload.exp))
}

#[cfg(test)]
#[path = "tests/gotrue_tests.rs"]
mod tests;
