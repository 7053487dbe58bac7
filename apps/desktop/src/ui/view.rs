//! Text rendering of controller snapshots.

use std::fmt::Write as _;

use client_core::SyncSnapshot;

use crate::controller::events::UiError;

pub fn render(snapshot: &SyncSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "status: {}", snapshot.status);
    if let Some(hint) = snapshot
        .error
        .as_ref()
        .and_then(|err| UiError::from_sync_error(err).hint())
    {
        let _ = writeln!(out, "  hint: {hint}");
    }
    if !snapshot.is_authenticated() {
        let _ = write!(out, "signed out ({})", snapshot.state.name());
        return out;
    }

    let _ = writeln!(out, "signed in ({})", snapshot.state.name());
    match &snapshot.profile {
        Some(view) => {
            let _ = writeln!(out, "  provider:     {}", view.provider);
            let _ = writeln!(out, "  display name: {}", view.display_name);
            let _ = writeln!(out, "  email:        {}", view.email);
            let _ = writeln!(out, "  avatar:       {}", view.avatar_url);
        }
        None => {
            let _ = writeln!(out, "  profile not loaded");
        }
    }
    let _ = write!(
        out,
        "  edit form:    display_name={:?} avatar_url={:?}",
        snapshot.edit.display_name.as_deref().unwrap_or_default(),
        snapshot.edit.avatar_url.as_deref().unwrap_or_default()
    );
    out
}
