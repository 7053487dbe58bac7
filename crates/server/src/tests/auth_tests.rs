use super::*;
use axum::{http::HeaderValue, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey};
use serde_json::json;
use tokio::net::TcpListener;

const ISSUER_SUFFIX: &str = "/auth/v1";
const SECRET: &str = "profile-sync-jwks-test-secret-000";
const SECRET_B64URL: &str = "cHJvZmlsZS1zeW5jLWp3a3MtdGVzdC1zZWNyZXQtMDAw";

fn settings(supabase_url: &str, secret: Option<&str>) -> Settings {
    Settings {
        server_bind: "127.0.0.1:0".to_string(),
        database_url: "sqlite::memory:".to_string(),
        supabase_url: supabase_url.to_string(),
        supabase_anon_key: "anon".to_string(),
        jwt_audience: "authenticated".to_string(),
        jwt_issuer: format!("{supabase_url}{ISSUER_SUFFIX}"),
        jwks_url: format!("{supabase_url}{ISSUER_SUFFIX}/keys"),
        jwt_secret: secret.map(str::to_string),
        allowed_origins: Vec::new(),
    }
}

fn mint(supabase_url: &str, sub: &str, aud: &str, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = kid.map(str::to_string);
    let claims = json!({
        "sub": sub,
        "aud": aud,
        "iss": format!("{supabase_url}{ISSUER_SUFFIX}"),
        "exp": Utc::now().timestamp() + 3600,
        "email": "ann@example.com",
        "app_metadata": { "provider": "github" },
    });
    encode(&header, &claims, &EncodingKey::from_secret(SECRET.as_bytes())).expect("token")
}

async fn spawn_jwks_server() -> anyhow::Result<String> {
    let jwks = json!({
        "keys": [{ "kty": "oct", "kid": "test-kid", "alg": "HS256", "k": SECRET_B64URL }]
    });
    let app = Router::new()
        .route(
            "/auth/v1/keys",
            get(|| async { StatusCode::NOT_FOUND }),
        )
        .route(
            "/auth/v1/.well-known/jwks.json",
            get(move || {
                let jwks = jwks.clone();
                async move { Json(jwks) }
            }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

#[test]
fn bearer_token_requires_bearer_scheme() {
    let mut headers = HeaderMap::new();
    assert!(matches!(bearer_token(&headers), Err(AuthError::MissingBearer)));

    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
    assert!(matches!(bearer_token(&headers), Err(AuthError::MissingBearer)));

    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
    assert!(matches!(bearer_token(&headers), Err(AuthError::MissingBearer)));

    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer tok"));
    assert_eq!(bearer_token(&headers).expect("token"), "tok");
}

#[tokio::test]
async fn shared_secret_token_is_accepted() {
    let url = "https://demo.supabase.co";
    let verifier = JwtVerifier::from_settings(&settings(url, Some(SECRET)));
    let sub = Uuid::new_v4();

    let user = verifier
        .verify(&mint(url, &sub.to_string(), "authenticated", None))
        .await
        .expect("verified");

    assert_eq!(user.user_id, UserId(sub));
    assert_eq!(user.email.as_deref(), Some("ann@example.com"));
    assert_eq!(user.provider.as_deref(), Some("github"));
}

#[tokio::test]
async fn wrong_audience_is_rejected() {
    let url = "https://demo.supabase.co";
    let verifier = JwtVerifier::from_settings(&settings(url, Some(SECRET)));
    let err = verifier
        .verify(&mint(url, &Uuid::new_v4().to_string(), "anon", None))
        .await
        .expect_err("must fail");
    assert!(matches!(err, AuthError::InvalidToken(_)), "{err}");
}

#[tokio::test]
async fn non_uuid_subject_is_rejected() {
    let url = "https://demo.supabase.co";
    let verifier = JwtVerifier::from_settings(&settings(url, Some(SECRET)));
    let err = verifier
        .verify(&mint(url, "not-a-uuid", "authenticated", None))
        .await
        .expect_err("must fail");
    assert!(matches!(err, AuthError::InvalidSubject));
}

#[tokio::test]
async fn jwks_lookup_falls_back_to_next_candidate() {
    let url = spawn_jwks_server().await.expect("jwks server");
    let verifier = JwtVerifier::from_settings(&settings(&url, None));
    let sub = Uuid::new_v4();

    let user = verifier
        .verify(&mint(&url, &sub.to_string(), "authenticated", Some("test-kid")))
        .await
        .expect("verified");
    assert_eq!(user.user_id, UserId(sub));
    assert!(verifier.jwks_cache.read().await.is_some());
}

#[tokio::test]
async fn jwks_rejects_missing_and_unknown_kid() {
    let url = spawn_jwks_server().await.expect("jwks server");
    let verifier = JwtVerifier::from_settings(&settings(&url, None));
    let sub = Uuid::new_v4().to_string();

    let missing = verifier
        .verify(&mint(&url, &sub, "authenticated", None))
        .await
        .expect_err("must fail");
    assert!(matches!(missing, AuthError::MissingKid));

    let unknown = verifier
        .verify(&mint(&url, &sub, "authenticated", Some("other-kid")))
        .await
        .expect_err("must fail");
    assert!(matches!(unknown, AuthError::UnknownKid));
}

#[tokio::test]
async fn unreachable_jwks_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("addr"));
    drop(listener);

    let verifier = JwtVerifier::from_settings(&settings(&url, None));
    let err = verifier
        .verify(&mint(&url, &Uuid::new_v4().to_string(), "authenticated", Some("k")))
        .await
        .expect_err("must fail");
    assert!(matches!(err, AuthError::Jwks(_)));
}
