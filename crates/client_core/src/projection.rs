//! Pure mapping from a profile record to the strings the view displays.

use shared::domain::{ProfileRecord, ProfileUpdate};

use crate::session::IdentityClaims;

pub const UNSET_DISPLAY_NAME: &str = "unset";
pub const NO_EMAIL: &str = "no email";
pub const UNKNOWN_PROVIDER: &str = "unknown";
pub const PLACEHOLDER_AVATAR_URL: &str = "https://api.dicebear.com/7.x/shapes/svg?seed=user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileView {
    pub provider: String,
    pub display_name: String,
    pub email: String,
    pub avatar_url: String,
}

/// Values held by the edit form between user input and submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditDraft {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl EditDraft {
    pub fn new(display_name: impl Into<String>, avatar_url: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            avatar_url: Some(avatar_url.into()),
        }
    }

    /// Form values after a successful load, so a bare submit keeps what is stored.
    pub fn seeded_from(record: &ProfileRecord) -> Self {
        Self::new(
            record.display_name.clone().unwrap_or_default(),
            record.avatar_url.clone().unwrap_or_default(),
        )
    }

    pub fn to_update(&self) -> ProfileUpdate {
        ProfileUpdate {
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

pub fn project(record: &ProfileRecord, claims: Option<&IdentityClaims>) -> ProfileView {
    let provider = claims
        .map(|c| c.provider.as_str())
        .and_then(non_empty)
        .or_else(|| record.provider.as_deref().and_then(non_empty))
        .unwrap_or(UNKNOWN_PROVIDER);
    let display_name = record
        .display_name
        .as_deref()
        .and_then(non_empty)
        .or_else(|| record.name.as_deref().and_then(non_empty))
        .unwrap_or(UNSET_DISPLAY_NAME);
    let email = record
        .email
        .as_deref()
        .and_then(non_empty)
        .unwrap_or(NO_EMAIL);
    let avatar_url = record
        .avatar_url
        .as_deref()
        .and_then(non_empty)
        .unwrap_or(PLACEHOLDER_AVATAR_URL);

    ProfileView {
        provider: provider.to_string(),
        display_name: display_name.to_string(),
        email: email.to_string(),
        avatar_url: avatar_url.to_string(),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}
