use serde::{Deserialize, Serialize};

use crate::domain::ProfileRecord;

pub const HEALTH_ROUTE: &str = "/health";
pub const CURRENT_USER_ROUTE: &str = "/users/me";
pub const USERS_ROUTE: &str = "/users";

pub const DEFAULT_USERS_LIMIT: u32 = 20;
pub const MAX_USERS_LIMIT: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListUsersResponse {
    pub items: Vec<ProfileRecord>,
    pub count: usize,
}

/// Auth API root for a Supabase-style identity provider (`<url>/auth/v1`).
pub fn auth_base_url(provider_url: &str) -> String {
    format!("{}/auth/v1", provider_url.trim_end_matches('/'))
}

/// JWKS locations tried in order. Deployments differ on which one they serve.
pub fn jwks_candidate_urls(provider_url: &str, explicit: Option<&str>) -> Vec<String> {
    let base = provider_url.trim_end_matches('/');
    let auth = auth_base_url(base);
    let mut candidates = Vec::with_capacity(4);
    if let Some(explicit) = explicit.filter(|v| !v.trim().is_empty()) {
        candidates.push(explicit.to_string());
    } else {
        candidates.push(format!("{auth}/keys"));
    }
    for url in [
        format!("{auth}/.well-known/jwks.json"),
        format!("{auth}/jwks"),
        format!("{base}/.well-known/jwks.json"),
    ] {
        if !candidates.contains(&url) {
            candidates.push(url);
        }
    }
    candidates
}
