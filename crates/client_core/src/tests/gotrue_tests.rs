use std::sync::Mutex as StdMutex;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use tokio::{net::TcpListener, sync::Mutex};

use super::*;

fn token_with(payload: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.signature")
}

fn github_token(exp: i64) -> String {
    token_with(serde_json::json!({
        "sub": "7f9c2e43-4d0a-4f55-9a55-2f6a1b0f1d11",
        "email": "ann@example.com",
        "exp": exp,
        "app_metadata": { "provider": "github" }
    }))
}

fn in_one_hour() -> i64 {
    (Utc::now() + Duration::hours(1)).timestamp()
}

#[derive(Default)]
struct RecordingLauncher {
    launched: StdMutex<Vec<(String, String)>>,
}

impl SignInLauncher for RecordingLauncher {
    fn launch(&self, provider_id: &str, authorize_url: &Url) -> Result<(), ProviderError> {
        self.launched
            .lock()
            .expect("launcher lock")
            .push((provider_id.to_string(), authorize_url.to_string()));
        Ok(())
    }
}

#[derive(Clone)]
struct AuthServerState {
    logout_status: StatusCode,
    logout_headers: Arc<Mutex<Vec<(String, String)>>>,
}

async fn spawn_auth_server(logout_status: StatusCode) -> (String, AuthServerState) {
    async fn settings() -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "external": { "github": true, "google": false, "email": true }
        }))
    }

    async fn logout(State(state): State<AuthServerState>, headers: HeaderMap) -> StatusCode {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        state
            .logout_headers
            .lock()
            .await
            .push((header("authorization"), header("apikey")));
        state.logout_status
    }

    let state = AuthServerState {
        logout_status,
        logout_headers: Arc::new(Mutex::new(Vec::new())),
    };
    let router = Router::new()
        .route("/auth/v1/settings", get(settings))
        .route("/auth/v1/logout", post(logout))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    (format!("http://{addr}"), state)
}

#[test]
fn authorize_url_carries_provider_and_encoded_redirect() {
    let provider = GoTrueSessionProvider::new("https://project.supabase.co/", "anon");

    let url = provider
        .authorize_url("github", "http://localhost:5173/callback.html")
        .expect("url");

    assert_eq!(
        url.as_str(),
        "https://project.supabase.co/auth/v1/authorize?provider=github&redirect_to=http%3A%2F%2Flocalhost%3A5173%2Fcallback.html"
    );
}

#[tokio::test]
async fn access_token_seeds_session_with_claims_and_expiry() {
    let provider = GoTrueSessionProvider::new("https://project.supabase.co", "anon");
    let exp = in_one_hour();
    let token = github_token(exp);

    let session = provider.with_access_token(&token).await.expect("session");

    assert_eq!(session.identity_claims.provider, "github");
    assert_eq!(
        session.identity_claims.user_id,
        "7f9c2e43-4d0a-4f55-9a55-2f6a1b0f1d11"
    );
    assert_eq!(
        session.identity_claims.email.as_deref(),
        Some("ann@example.com")
    );
    assert_eq!(session.expires_at.map(|at| at.timestamp()), Some(exp));
    assert_eq!(
        provider.get_current_session().await.expect("query"),
        Some(session)
    );
}

#[tokio::test]
async fn expired_session_reads_as_signed_out() {
    let provider = GoTrueSessionProvider::new("https://project.supabase.co", "anon");
    let expired = (Utc::now() - Duration::minutes(5)).timestamp();

    provider
        .with_access_token(&github_token(expired))
        .await
        .expect("session");

    assert_eq!(provider.get_current_session().await.expect("query"), None);
}

#[tokio::test]
async fn token_without_payload_is_rejected() {
    let provider = GoTrueSessionProvider::new("https://project.supabase.co", "anon");

    let err = provider
        .with_access_token("opaque-token")
        .await
        .expect_err("not a jwt");

    assert_eq!(err.message, "access token is not a JWT");
    assert_eq!(provider.get_current_session().await.expect("query"), None);
}

#[tokio::test]
async fn redirect_fragment_becomes_session() {
    let provider = GoTrueSessionProvider::new("https://project.supabase.co", "anon");
    let token = github_token(in_one_hour());
    let redirect = format!(
        "http://localhost:5173/callback.html#access_token={token}&expires_in=3600&refresh_token=r1&token_type=bearer"
    );

    let session = provider
        .restore_from_redirect(&redirect)
        .await
        .expect("session");

    assert_eq!(session.access_token, token);
    assert_eq!(session.identity_claims.provider, "github");
    let expires_at = session.expires_at.expect("expiry");
    assert!(expires_at > Utc::now() + Duration::minutes(59));
    assert!(provider
        .get_current_session()
        .await
        .expect("query")
        .is_some());
}

#[tokio::test]
async fn redirect_with_out_of_range_expiry_is_rejected() {
    let provider = GoTrueSessionProvider::new("https://project.supabase.co", "anon");
    let token = github_token(in_one_hour());
    let redirect = format!(
        "http://localhost:5173/callback.html#access_token={token}&expires_in=99999999999999"
    );

    let err = provider
        .restore_from_redirect(&redirect)
        .await
        .expect_err("expiry overflows");

    assert_eq!(err.message, "invalid expires_in: 99999999999999");
    assert_eq!(provider.get_current_session().await.expect("query"), None);
}

#[tokio::test]
async fn redirect_error_surfaces_description() {
    let provider = GoTrueSessionProvider::new("https://project.supabase.co", "anon");

    let err = provider
        .restore_from_redirect(
            "http://localhost:5173/callback.html#error=access_denied&error_description=User+denied+access",
        )
        .await
        .expect_err("denied");

    assert_eq!(err.message, "User denied access");
}

#[tokio::test]
async fn redirect_without_token_is_rejected() {
    let provider = GoTrueSessionProvider::new("https://project.supabase.co", "anon");

    let err = provider
        .restore_from_redirect("http://localhost:5173/callback.html")
        .await
        .expect_err("no token");

    assert_eq!(err.message, "redirect carried no access token");
}

#[tokio::test]
async fn sign_in_launches_authorize_url_for_enabled_provider() {
    let (base, _) = spawn_auth_server(StatusCode::NO_CONTENT).await;
    let launcher = Arc::new(RecordingLauncher::default());
    let provider = GoTrueSessionProvider::new(&base, "anon").with_launcher(launcher.clone());
    let options = SignInOptions {
        redirect_to: "http://localhost:5173/callback.html".to_string(),
    };

    provider
        .sign_in_with_provider("github", &options)
        .await
        .expect("sign in");

    let launched = launcher.launched.lock().expect("launcher lock").clone();
    assert_eq!(launched.len(), 1);
    assert_eq!(launched[0].0, "github");
    assert!(launched[0]
        .1
        .starts_with(&format!("{base}/auth/v1/authorize?provider=github")));
}

#[tokio::test]
async fn sign_in_rejects_disabled_provider() {
    let (base, _) = spawn_auth_server(StatusCode::NO_CONTENT).await;
    let launcher = Arc::new(RecordingLauncher::default());
    let provider = GoTrueSessionProvider::new(&base, "anon").with_launcher(launcher.clone());
    let options = SignInOptions {
        redirect_to: "http://localhost:5173/callback.html".to_string(),
    };

    let err = provider
        .sign_in_with_provider("google", &options)
        .await
        .expect_err("disabled");

    assert_eq!(err.message, "provider google is not enabled");
    assert!(launcher.launched.lock().expect("launcher lock").is_empty());
}

#[tokio::test]
async fn sign_out_revokes_with_bearer_and_apikey() {
    let (base, state) = spawn_auth_server(StatusCode::NO_CONTENT).await;
    let provider = GoTrueSessionProvider::new(&base, "anon");
    let token = github_token(in_one_hour());
    provider.with_access_token(&token).await.expect("session");

    provider.sign_out().await.expect("sign out");

    assert_eq!(
        *state.logout_headers.lock().await,
        vec![(format!("Bearer {token}"), "anon".to_string())]
    );
    assert_eq!(provider.get_current_session().await.expect("query"), None);
}

#[tokio::test]
async fn rejected_sign_out_still_clears_session() {
    let (base, _) = spawn_auth_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    let provider = GoTrueSessionProvider::new(&base, "anon");
    provider
        .with_access_token(&github_token(in_one_hour()))
        .await
        .expect("session");

    let err = provider.sign_out().await.expect_err("rejected");

    assert!(err.message.starts_with("500"), "{}", err.message);
    assert_eq!(provider.get_current_session().await.expect("query"), None);
}

#[tokio::test]
async fn sign_out_without_session_skips_the_network() {
    let (base, state) = spawn_auth_server(StatusCode::NO_CONTENT).await;
    let provider = GoTrueSessionProvider::new(&base, "anon");

    provider.sign_out().await.expect("sign out");

    assert!(state.logout_headers.lock().await.is_empty());
}
