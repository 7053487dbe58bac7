use axum::{http::StatusCode, routing::get, Json, Router};
use tokio::net::TcpListener;

use super::*;

async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

fn cli(url: Option<&str>, key: Option<&str>) -> Cli {
    Cli {
        supabase_url: url.map(str::to_string),
        anon_key: key.map(str::to_string),
        jwks_url: None,
        database_url: "sqlite::memory:".to_string(),
    }
}

#[test]
fn masks_secrets_by_length() {
    assert_eq!(mask(""), "<empty>");
    assert_eq!(mask("short"), "*****");
    assert_eq!(mask("12345678"), "********");
    assert_eq!(mask("abcdefghijklmnopwxyz"), "abcd***wxyz");
}

#[test]
fn reports_every_missing_variable() {
    let err = required_env(&cli(None, Some("  "))).expect_err("missing");
    assert_eq!(
        err.to_string(),
        "missing env vars: SUPABASE_URL, SUPABASE_ANON_KEY"
    );

    let (url, key) =
        required_env(&cli(Some("https://p.supabase.co/"), Some("anon"))).expect("present");
    assert_eq!(url, "https://p.supabase.co");
    assert_eq!(key, "anon");
}

#[tokio::test]
async fn jwks_falls_through_to_first_candidate_with_keys() {
    let router = Router::new()
        .route("/auth/v1/keys", get(|| async { StatusCode::NOT_FOUND }))
        .route(
            "/auth/v1/.well-known/jwks.json",
            get(|| async { Json(serde_json::json!({ "keys": [] })) }),
        )
        .route(
            "/auth/v1/jwks",
            get(|| async { Json(serde_json::json!({ "keys": [{ "kid": "a" }, { "kid": "b" }] })) }),
        );
    let base = spawn_server(router).await;

    let (url, keys) = fetch_jwks(&Client::new(), &base, "anon", None)
        .await
        .expect("jwks");

    assert_eq!(url, format!("{base}/auth/v1/jwks"));
    assert_eq!(keys, 2);
}

#[tokio::test]
async fn jwks_failure_names_last_error() {
    let base = spawn_server(Router::new()).await;

    let err = fetch_jwks(&Client::new(), &base, "", None)
        .await
        .expect_err("no jwks");

    assert!(format!("{err:#}").contains("failed to fetch JWKS"), "{err:#}");
}

#[tokio::test]
async fn health_returns_provider_body() {
    let router = Router::new().route(
        "/auth/v1/health",
        get(|| async { Json(serde_json::json!({ "name": "GoTrue" })) }),
    );
    let base = spawn_server(router).await;

    let body = check_health(&Client::new(), &base, "anon")
        .await
        .expect("health");

    assert_eq!(body["name"], "GoTrue");
}

fn sqlite_url(path: &std::path::Path) -> String {
    format!("sqlite://{}", path.to_string_lossy().replace('\\', "/"))
}

#[tokio::test]
async fn migrated_profiles_table_is_reachable() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let database_url = sqlite_url(&temp_root.path().join("profiles.db"));
    drop(Storage::new(&database_url).await.expect("db"));

    let rows = check_profiles_table(&database_url).await.expect("check");

    assert_eq!(rows, 0);
}

#[tokio::test]
async fn missing_database_fails_without_creating_it() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("absent.db");

    let err = check_profiles_table(&sqlite_url(&db_path))
        .await
        .expect_err("no database");

    assert!(err.to_string().starts_with("failed to open"), "{err}");
    assert!(!db_path.exists());
}
