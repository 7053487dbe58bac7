use std::sync::Arc;

use server_api::ApiContext;

use crate::auth::JwtVerifier;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) verifier: Arc<JwtVerifier>,
}
