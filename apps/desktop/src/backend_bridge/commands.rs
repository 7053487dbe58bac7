//! Backend commands queued from the terminal loop to the backend worker.

use client_core::{EditDraft, SyncCommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCommand {
    Refresh,
    Login { provider_id: String },
    /// Redirect URL pasted back from the browser after sign-in.
    Callback { redirect_url: String },
    Logout,
    Edit { draft: EditDraft },
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::Login { .. } => "login",
            Self::Callback { .. } => "callback",
            Self::Logout => "logout",
            Self::Edit { .. } => "edit",
        }
    }

    /// The controller operation this command maps to. `Callback` first
    /// restores the session and then refreshes.
    pub fn into_sync_command(self) -> SyncCommand {
        match self {
            Self::Refresh | Self::Callback { .. } => SyncCommand::Refresh,
            Self::Login { provider_id } => SyncCommand::SignIn { provider_id },
            Self::Logout => SyncCommand::SignOut,
            Self::Edit { draft } => SyncCommand::SubmitEdit(draft),
        }
    }
}
