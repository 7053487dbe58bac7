use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    pub provider: String,
    pub user_id: String,
    pub email: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub identity_claims: IdentityClaims,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn has_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("identity_claims", &self.identity_claims)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInOptions {
    pub redirect_to: String,
}

/// Identity-provider capability used by the sync controller.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_current_session(&self) -> Result<Option<Session>, ProviderError>;
    /// Starts an interactive sign-in. The session shows up later through
    /// `get_current_session`, usually after the provider redirects back.
    async fn sign_in_with_provider(
        &self,
        provider_id: &str,
        options: &SignInOptions,
    ) -> Result<(), ProviderError>;
    async fn sign_out(&self) -> Result<(), ProviderError>;
}
