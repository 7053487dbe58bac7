use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    domain::{ProfileRecord, ProfileUpdate},
    protocol::CURRENT_USER_ROUTE,
};

use crate::error::TransportError;

#[async_trait]
pub trait ProfileClient: Send + Sync {
    async fn fetch_profile(&self, access_token: &str) -> Result<ProfileRecord, TransportError>;
    /// Full replace of the editable fields; the backend returns the stored record.
    async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<ProfileRecord, TransportError>;
}

pub struct HttpProfileClient {
    http: Client,
    backend_url: String,
}

impl HttpProfileClient {
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), backend_url)
    }

    pub fn with_client(http: Client, backend_url: impl Into<String>) -> Self {
        let backend_url = backend_url.into().trim_end_matches('/').to_string();
        Self { http, backend_url }
    }

    fn current_user_url(&self) -> String {
        format!("{}{CURRENT_USER_ROUTE}", self.backend_url)
    }
}

#[async_trait]
impl ProfileClient for HttpProfileClient {
    async fn fetch_profile(&self, access_token: &str) -> Result<ProfileRecord, TransportError> {
        let res = self
            .http
            .get(self.current_user_url())
            .bearer_auth(access_token)
            .send()
            .await?;
        read_profile(res).await
    }

    async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<ProfileRecord, TransportError> {
        let res = self
            .http
            .put(self.current_user_url())
            .bearer_auth(access_token)
            .json(update)
            .send()
            .await?;
        read_profile(res).await
    }
}

async fn read_profile(res: Response) -> Result<ProfileRecord, TransportError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(TransportError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let bytes = res.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "tests/profile_client_tests.rs"]
mod tests;
