use std::{process::ExitCode, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use reqwest::Client;
use serde_json::Value;
use shared::protocol::{auth_base_url, jwks_candidate_urls};
use storage::Storage;
use tracing_subscriber::EnvFilter;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Checks that the identity provider and the profile store are reachable.
#[derive(Parser, Debug)]
#[command(name = "profile-sync-check")]
struct Cli {
    #[arg(long, env = "SUPABASE_URL", hide_env_values = true)]
    supabase_url: Option<String>,
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    anon_key: Option<String>,
    #[arg(long, env = "SUPABASE_JWKS_URL")]
    jwks_url: Option<String>,
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/profiles.db")]
    database_url: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();
    let cli = Cli::parse();
    match run(&cli).await {
        Ok(()) => {
            println!("All connectivity checks passed.");
            ExitCode::SUCCESS
        }
        Err(_) => ExitCode::FAILURE,
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let (url, anon_key) = step("env", || required_env(cli))?;
    println!("  - SUPABASE_URL: {}", mask(&url));
    println!("  - SUPABASE_ANON_KEY: {}", mask(&anon_key));
    println!("  - DATABASE_URL: {}", cli.database_url);

    let http = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let health = report("health", check_health(&http, &url, &anon_key).await)?;
    println!("  {}/health -> {health}", auth_base_url(&url));

    let (jwks_url, keys) = report(
        "jwks",
        fetch_jwks(&http, &url, &anon_key, cli.jwks_url.as_deref()).await,
    )?;
    println!("  fetched from {jwks_url}, keys={keys}");

    let rows = report("database", check_profiles_table(&cli.database_url).await)?;
    println!("  profiles table reachable (rows previewed: {rows})");
    Ok(())
}

fn step<T>(name: &str, check: impl FnOnce() -> Result<T>) -> Result<T> {
    report(name, check())
}

fn report<T>(name: &str, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => println!("[{name}] ✅"),
        Err(err) => println!("[{name}] ❌ {err:#}"),
    }
    result
}

fn required_env(cli: &Cli) -> Result<(String, String)> {
    let url = cli.supabase_url.as_deref().map(str::trim).unwrap_or_default();
    let anon_key = cli.anon_key.as_deref().map(str::trim).unwrap_or_default();
    let missing: Vec<&str> = [("SUPABASE_URL", url), ("SUPABASE_ANON_KEY", anon_key)]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();
    if !missing.is_empty() {
        bail!("missing env vars: {}", missing.join(", "));
    }
    Ok((url.trim_end_matches('/').to_string(), anon_key.to_string()))
}

/// Keeps the first and last four characters of longer secrets.
fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    match chars.len() {
        0 => "<empty>".to_string(),
        len if len <= 8 => "*".repeat(len),
        len => format!(
            "{}***{}",
            chars[..4].iter().collect::<String>(),
            chars[len - 4..].iter().collect::<String>()
        ),
    }
}

async fn check_health(http: &Client, url: &str, anon_key: &str) -> Result<Value> {
    let health_url = format!("{}/health", auth_base_url(url));
    let res = http
        .get(&health_url)
        .header("apikey", anon_key)
        .send()
        .await
        .with_context(|| format!("GET {health_url}"))?
        .error_for_status()?;
    Ok(res.json().await?)
}

async fn fetch_jwks(
    http: &Client,
    url: &str,
    anon_key: &str,
    explicit: Option<&str>,
) -> Result<(String, usize)> {
    let mut last_error = anyhow!("no JWKS candidates");
    for candidate in jwks_candidate_urls(url, explicit) {
        match fetch_key_count(http, &candidate, anon_key).await {
            Ok(count) => return Ok((candidate, count)),
            Err(err) => {
                tracing::debug!(url = %candidate, error = %err, "JWKS candidate failed");
                last_error = err;
            }
        }
    }
    Err(last_error.context("failed to fetch JWKS"))
}

async fn fetch_key_count(http: &Client, candidate: &str, anon_key: &str) -> Result<usize> {
    let mut req = http.get(candidate);
    if !anon_key.is_empty() {
        req = req.header("apikey", anon_key);
    }
    let jwks: Value = req.send().await?.error_for_status()?.json().await?;
    match jwks.get("keys").and_then(Value::as_array) {
        Some(keys) if !keys.is_empty() => Ok(keys.len()),
        _ => bail!("{candidate} returned no keys"),
    }
}

async fn check_profiles_table(database_url: &str) -> Result<usize> {
    let storage = Storage::open_existing(database_url)
        .await
        .with_context(|| format!("failed to open {database_url}"))?;
    storage.health_check().await?;
    Ok(storage.list_profiles(1, 0).await?.len())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
