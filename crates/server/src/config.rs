use std::{collections::HashMap, fs};

use anyhow::{bail, Context};
use shared::protocol::auth_base_url;

const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub jwks_url: String,
    pub jwt_secret: Option<String>,
    pub allowed_origins: Vec<String>,
}

/// Values that may be overridden before the derived defaults are computed.
#[derive(Debug, Default)]
struct RawSettings {
    host: Option<String>,
    port: Option<String>,
    database_url: Option<String>,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    jwt_audience: Option<String>,
    jwt_issuer: Option<String>,
    jwks_url: Option<String>,
    jwt_secret: Option<String>,
    allowed_origins: Option<String>,
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let raw_file = fs::read_to_string(SETTINGS_FILE).ok();
    settings_from_sources(raw_file.as_deref(), |key| std::env::var(key).ok())
}

pub(crate) fn settings_from_sources(
    raw_file: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut raw = RawSettings::default();

    if let Some(raw_file) = raw_file {
        let file_cfg = toml::from_str::<HashMap<String, String>>(raw_file)
            .with_context(|| format!("failed to parse {SETTINGS_FILE}"))?;
        raw.host = file_cfg.get("host").cloned();
        raw.port = file_cfg.get("port").cloned();
        raw.database_url = file_cfg.get("database_url").cloned();
        raw.supabase_url = file_cfg.get("supabase_url").cloned();
        raw.jwt_audience = file_cfg.get("jwt_audience").cloned();
        raw.allowed_origins = file_cfg.get("allowed_origins").cloned();
    }

    let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    if let Some(v) = env("APP_HOST") {
        raw.host = Some(v);
    }
    if let Some(v) = env("APP_PORT") {
        raw.port = Some(v);
    }
    if let Some(v) = env("DATABASE_URL") {
        raw.database_url = Some(v);
    }
    if let Some(v) = env("SUPABASE_URL") {
        raw.supabase_url = Some(v);
    }
    if let Some(v) = env("SUPABASE_ANON_KEY") {
        raw.supabase_anon_key = Some(v);
    }
    if let Some(v) = env("SUPABASE_JWT_AUD") {
        raw.jwt_audience = Some(v);
    }
    if let Some(v) = env("SUPABASE_JWT_ISS") {
        raw.jwt_issuer = Some(v);
    }
    if let Some(v) = env("SUPABASE_JWKS_URL") {
        raw.jwks_url = Some(v);
    }
    if let Some(v) = env("SUPABASE_JWT_SECRET") {
        raw.jwt_secret = Some(v);
    }
    if let Some(v) = env("ALLOWED_ORIGINS") {
        raw.allowed_origins = Some(v);
    }

    finalize(raw)
}

fn finalize(raw: RawSettings) -> anyhow::Result<Settings> {
    let Some(supabase_url) = raw.supabase_url else {
        bail!("missing SUPABASE_URL environment variable");
    };
    let supabase_url = supabase_url.trim().trim_end_matches('/').to_string();
    url::Url::parse(&supabase_url)
        .with_context(|| format!("SUPABASE_URL is not a valid url: '{supabase_url}'"))?;

    let port: u16 = match raw.port {
        Some(port) => port
            .parse()
            .with_context(|| format!("APP_PORT must be a port number, got '{port}'"))?,
        None => 8000,
    };
    let host = raw.host.unwrap_or_else(|| "0.0.0.0".to_string());
    let auth_base = auth_base_url(&supabase_url);

    Ok(Settings {
        server_bind: format!("{host}:{port}"),
        database_url: raw
            .database_url
            .unwrap_or_else(|| "sqlite://./data/profiles.db".to_string()),
        jwt_audience: raw
            .jwt_audience
            .unwrap_or_else(|| "authenticated".to_string()),
        jwt_issuer: raw.jwt_issuer.unwrap_or_else(|| auth_base.clone()),
        jwks_url: raw.jwks_url.unwrap_or_else(|| format!("{auth_base}/keys")),
        supabase_anon_key: raw.supabase_anon_key.unwrap_or_default(),
        jwt_secret: raw.jwt_secret,
        allowed_origins: raw
            .allowed_origins
            .map(|origins| parse_origins(&origins))
            .unwrap_or_default(),
        supabase_url,
    })
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
