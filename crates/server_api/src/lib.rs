use serde_json::Value;
use shared::{
    domain::{ProfileRecord, ProfileUpdate, UserId},
    error::{ApiError, ErrorCode},
    protocol::{ListUsersQuery, ListUsersResponse, DEFAULT_USERS_LIMIT, MAX_USERS_LIMIT},
};
use storage::{NewProfile, Storage};
use tracing::info;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

/// Caller identity after bearer-token verification.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: UserId,
    pub email: Option<String>,
    pub provider: Option<String>,
    pub claims: Value,
}

/// First-seen profile built from the identity provider's claims.
pub fn profile_payload(user: &AuthedUser) -> NewProfile {
    let meta = user.claims.get("user_metadata");
    let meta_str = |key: &str| {
        meta.and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let display_name = meta_str("full_name")
        .or_else(|| meta_str("name"))
        .or_else(|| meta_str("user_name"))
        .or_else(|| user.email.clone());
    let avatar_url = meta_str("avatar_url").or_else(|| meta_str("picture"));

    NewProfile {
        user_id: user.user_id,
        provider: user
            .provider
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        provider_id: meta_str("sub").unwrap_or_else(|| user.user_id.to_string()),
        email: user.email.clone(),
        display_name,
        avatar_url,
    }
}

pub async fn current_profile(ctx: &ApiContext, user: &AuthedUser) -> Result<ProfileRecord, ApiError> {
    if let Some(stored) = ctx
        .storage
        .load_profile(user.user_id)
        .await
        .map_err(internal)?
    {
        return Ok(stored.into());
    }

    info!(user_id = %user.user_id, "creating profile on first access");
    let stored = ctx
        .storage
        .upsert_profile(&profile_payload(user))
        .await
        .map_err(internal)?;
    Ok(stored.into())
}

pub async fn update_current_profile(
    ctx: &ApiContext,
    user: &AuthedUser,
    update: &ProfileUpdate,
) -> Result<ProfileRecord, ApiError> {
    if update.is_empty() {
        return current_profile(ctx, user).await;
    }

    ctx.storage
        .update_profile(user.user_id, update)
        .await
        .map_err(internal)?
        .map(Into::into)
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "user not found"))
}

pub async fn list_profiles(
    ctx: &ApiContext,
    query: &ListUsersQuery,
) -> Result<ListUsersResponse, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_USERS_LIMIT)
        .clamp(1, MAX_USERS_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let items: Vec<ProfileRecord> = ctx
        .storage
        .list_profiles(limit, offset)
        .await
        .map_err(internal)?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(ListUsersResponse {
        count: items.len(),
        items,
    })
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
