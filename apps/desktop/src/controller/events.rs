//! Backend-to-UI events and error classification for the terminal front end.

use client_core::{PreconditionError, SyncError, SyncSnapshot, TransportError};

pub enum UiEvent {
    Snapshot(SyncSnapshot),
    AuthorizeUrl { provider_id: String, url: String },
    Info(String),
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Auth,
    Transport,
    Validation,
    Config,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    SignIn,
    Sync,
    General,
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        let category = if lower.contains("401")
            || lower.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("invalid token")
            || lower.contains("bearer")
            || lower.contains("sign in")
        {
            UiErrorCategory::Auth
        } else if lower.contains("configuration") {
            UiErrorCategory::Config
        } else if lower.contains("invalid")
            || lower.contains("missing")
            || lower.contains("malformed")
            || lower.contains("must not be empty")
        {
            UiErrorCategory::Validation
        } else if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("network")
            || lower.contains("unreachable")
            || lower.contains("disconnected")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn from_sync_error(err: &SyncError) -> Self {
        let category = match err {
            SyncError::ConfigMissing(_) => UiErrorCategory::Config,
            SyncError::Precondition(PreconditionError::NoSession) => UiErrorCategory::Auth,
            SyncError::Precondition(PreconditionError::EmptyProviderId) => {
                UiErrorCategory::Validation
            }
            SyncError::Transport(TransportError::Status { status, .. })
                if matches!(*status, 401 | 403) =>
            {
                UiErrorCategory::Auth
            }
            SyncError::Transport(TransportError::Network(_)) => UiErrorCategory::Transport,
            SyncError::Transport(TransportError::Decode(_)) => UiErrorCategory::Validation,
            SyncError::Transport(TransportError::Status { .. }) => UiErrorCategory::Unknown,
            SyncError::Provider(provider) => {
                return Self::from_message(UiErrorContext::SignIn, provider.message.clone());
            }
        };
        Self {
            category,
            context: UiErrorContext::Sync,
            message: err.to_string(),
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == UiErrorCategory::Auth
    }

    /// One-line suggestion printed under the status, if any applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self.category {
            UiErrorCategory::Auth => Some("sign in again with `login <provider>`"),
            UiErrorCategory::Transport => Some("check backend_url and that the backend is running"),
            UiErrorCategory::Config => Some("set the missing value in profile_sync.toml or PROFILE_SYNC__* variables"),
            UiErrorCategory::Validation | UiErrorCategory::Unknown => None,
        }
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
