use std::{fmt, sync::Arc};

use shared::domain::ProfileRecord;
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::{
    error::{PreconditionError, ProviderError, SyncError},
    profile_client::ProfileClient,
    projection::{project, EditDraft, ProfileView},
    session::{Session, SessionProvider, SignInOptions},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Unauthenticated,
    Authenticating,
    Syncing,
    Synced(ProfileRecord),
    SyncFailed(String),
    Updating,
    UpdateFailed(String),
}

impl SyncState {
    /// Whether the view shows the signed-in shell.
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            Self::Syncing
                | Self::Synced(_)
                | Self::SyncFailed(_)
                | Self::Updating
                | Self::UpdateFailed(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Syncing => "syncing",
            Self::Synced(_) => "synced",
            Self::SyncFailed(_) => "sync_failed",
            Self::Updating => "updating",
            Self::UpdateFailed(_) => "update_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    CheckingSession,
    SignedOut,
    SessionCheckFailed,
    SyncingProfile,
    ProfileLoaded,
    FetchFailed(String),
    RedirectingToProvider,
    SignInFailed(String),
    SigningOut,
    SignedOutDone,
    SignOutFailed(String),
    MustSignInFirst,
    UpdatingProfile,
    ProfileUpdated,
    UpdateFailed(String),
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::CheckingSession => f.write_str("checking session..."),
            Self::SignedOut => f.write_str("not signed in"),
            Self::SessionCheckFailed => {
                f.write_str("session check failed, please sign in again")
            }
            Self::SyncingProfile => f.write_str("loading profile..."),
            Self::ProfileLoaded => f.write_str("profile loaded"),
            Self::FetchFailed(reason) => write!(f, "failed to load profile: {reason}"),
            Self::RedirectingToProvider => f.write_str("redirecting to provider..."),
            Self::SignInFailed(message) => write!(f, "sign-in failed: {message}"),
            Self::SigningOut => f.write_str("signing out..."),
            Self::SignedOutDone => f.write_str("signed out"),
            Self::SignOutFailed(message) => write!(f, "sign-out failed: {message}"),
            Self::MustSignInFirst => f.write_str("must sign in first"),
            Self::UpdatingProfile => f.write_str("saving profile..."),
            Self::ProfileUpdated => f.write_str("profile updated"),
            Self::UpdateFailed(reason) => write!(f, "update failed: {reason}"),
        }
    }
}

/// Everything a view needs to render one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub state: SyncState,
    pub status: SyncStatus,
    pub error: Option<SyncError>,
    /// Present whenever the last successful load or save is still on screen.
    pub profile: Option<ProfileView>,
    pub edit: EditDraft,
}

impl SyncSnapshot {
    fn initial() -> Self {
        Self {
            state: SyncState::Unauthenticated,
            status: SyncStatus::Idle,
            error: None,
            profile: None,
            edit: EditDraft::default(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    fn sign_out_locally(&mut self) {
        self.state = SyncState::Unauthenticated;
        self.profile = None;
        self.edit = EditDraft::default();
    }
}

/// One named user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    Refresh,
    SignIn { provider_id: String },
    SignOut,
    SubmitEdit(EditDraft),
}

impl SyncCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::SignIn { .. } => "sign_in",
            Self::SignOut => "sign_out",
            Self::SubmitEdit(_) => "submit_edit",
        }
    }
}

struct ControllerState {
    generation: u64,
    snapshot: SyncSnapshot,
}

/// Reconciles the identity provider session, the backend profile and user
/// edits into one [`SyncSnapshot`].
///
/// Operations may overlap. Each one that replaces the view takes a new
/// generation; a result is applied only while its generation is current, so a
/// late response never overwrites state produced by a later operation.
pub struct SyncController {
    session_provider: Arc<dyn SessionProvider>,
    profile_client: Arc<dyn ProfileClient>,
    redirect_to: String,
    inner: Mutex<ControllerState>,
    snapshots: watch::Sender<SyncSnapshot>,
}

impl SyncController {
    pub fn new(
        session_provider: Arc<dyn SessionProvider>,
        profile_client: Arc<dyn ProfileClient>,
        redirect_to: impl Into<String>,
    ) -> Self {
        let (snapshots, _) = watch::channel(SyncSnapshot::initial());
        Self {
            session_provider,
            profile_client,
            redirect_to: redirect_to.into(),
            inner: Mutex::new(ControllerState {
                generation: 0,
                snapshot: SyncSnapshot::initial(),
            }),
            snapshots,
        }
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshots.subscribe()
    }

    /// Stream of published snapshots, starting with the current one.
    pub fn updates(&self) -> WatchStream<SyncSnapshot> {
        WatchStream::new(self.subscribe())
    }

    pub async fn dispatch(&self, command: SyncCommand) -> SyncSnapshot {
        debug!(command = command.name(), "dispatching sync command");
        match command {
            SyncCommand::Refresh => self.bootstrap().await,
            SyncCommand::SignIn { provider_id } => self.request_sign_in(&provider_id).await,
            SyncCommand::SignOut => self.request_sign_out().await,
            SyncCommand::SubmitEdit(draft) => self.submit_edit(draft).await,
        }
    }

    /// Checks the provider session and, when one exists, loads the profile.
    pub async fn bootstrap(&self) -> SyncSnapshot {
        let generation = self
            .begin(|snapshot| {
                if !snapshot.state.is_authenticated() {
                    snapshot.state = SyncState::Authenticating;
                }
                snapshot.status = SyncStatus::CheckingSession;
                snapshot.error = None;
            })
            .await;

        let session = match self.session_provider.get_current_session().await {
            Ok(Some(session)) if session.has_token() => session,
            Ok(Some(_)) => {
                let err = ProviderError::new("session has no access token");
                return self.session_check_failed(generation, err).await;
            }
            Ok(None) => {
                return self
                    .apply(generation, |snapshot| {
                        snapshot.sign_out_locally();
                        snapshot.status = SyncStatus::SignedOut;
                    })
                    .await
                    .unwrap_or_else(|current| current);
            }
            Err(err) => return self.session_check_failed(generation, err).await,
        };

        let syncing = self
            .apply(generation, |snapshot| {
                snapshot.state = SyncState::Syncing;
                snapshot.status = SyncStatus::SyncingProfile;
            })
            .await;
        if let Err(current) = syncing {
            return current;
        }

        let claims = session.identity_claims.clone();
        let fetched = self.profile_client.fetch_profile(&session.access_token).await;
        self.apply(generation, |snapshot| match fetched {
            Ok(record) => {
                snapshot.profile = Some(project(&record, Some(&claims)));
                snapshot.edit = EditDraft::seeded_from(&record);
                snapshot.state = SyncState::Synced(record);
                snapshot.status = SyncStatus::ProfileLoaded;
            }
            Err(err) => {
                warn!(error = %err, "profile fetch failed");
                let reason = err.to_string();
                snapshot.state = SyncState::SyncFailed(reason.clone());
                snapshot.status = SyncStatus::FetchFailed(reason);
                snapshot.error = Some(err.into());
            }
        })
        .await
        .unwrap_or_else(|current| current)
    }

    /// Starts the provider's interactive sign-in. The resulting session is
    /// picked up by a later [`bootstrap`](Self::bootstrap).
    pub async fn request_sign_in(&self, provider_id: &str) -> SyncSnapshot {
        let provider_id = provider_id.trim();
        if provider_id.is_empty() {
            let err = PreconditionError::EmptyProviderId;
            return self
                .set_status(SyncStatus::SignInFailed(err.to_string()), Some(err.into()))
                .await;
        }

        self.set_status(SyncStatus::RedirectingToProvider, None).await;
        let options = SignInOptions {
            redirect_to: self.redirect_to.clone(),
        };
        match self
            .session_provider
            .sign_in_with_provider(provider_id, &options)
            .await
        {
            Ok(()) => {
                info!(provider = provider_id, "sign-in started");
                self.snapshot()
            }
            Err(err) => {
                warn!(provider = provider_id, error = %err, "sign-in initiation failed");
                self.set_status(SyncStatus::SignInFailed(err.message.clone()), Some(err.into()))
                    .await
            }
        }
    }

    /// Clears local state first; a provider failure only changes the status.
    pub async fn request_sign_out(&self) -> SyncSnapshot {
        let generation = self
            .begin(|snapshot| {
                snapshot.sign_out_locally();
                snapshot.status = SyncStatus::SigningOut;
                snapshot.error = None;
            })
            .await;

        let outcome = self.session_provider.sign_out().await;
        self.apply(generation, |snapshot| match outcome {
            Ok(()) => snapshot.status = SyncStatus::SignedOutDone,
            Err(err) => {
                warn!(error = %err, "provider sign-out failed; local session cleared anyway");
                snapshot.status = SyncStatus::SignOutFailed(err.message.clone());
                snapshot.error = Some(err.into());
            }
        })
        .await
        .unwrap_or_else(|current| current)
    }

    /// Writes the draft as a full replace of the editable fields.
    pub async fn submit_edit(&self, draft: EditDraft) -> SyncSnapshot {
        let observed = self.inner.lock().await.generation;

        let session = match self.session_provider.get_current_session().await {
            Ok(Some(session)) if session.has_token() => session,
            Ok(_) => return self.reject_without_session(observed).await,
            Err(err) => {
                warn!(error = %err, "session check before profile write failed");
                return self.reject_without_session(observed).await;
            }
        };

        let generation = {
            let mut inner = self.inner.lock().await;
            if inner.generation != observed {
                info!(
                    observed,
                    current = inner.generation,
                    "profile edit superseded before write"
                );
                return inner.snapshot.clone();
            }
            inner.generation += 1;
            inner.snapshot.state = SyncState::Updating;
            inner.snapshot.status = SyncStatus::UpdatingProfile;
            inner.snapshot.error = None;
            inner.snapshot.edit = draft.clone();
            self.publish(&inner);
            inner.generation
        };

        let Session {
            access_token,
            identity_claims,
            ..
        } = session;
        let written = self
            .profile_client
            .update_profile(&access_token, &draft.to_update())
            .await;
        self.apply(generation, |snapshot| match written {
            Ok(record) => {
                snapshot.profile = Some(project(&record, Some(&identity_claims)));
                snapshot.edit = EditDraft::seeded_from(&record);
                snapshot.state = SyncState::Synced(record);
                snapshot.status = SyncStatus::ProfileUpdated;
            }
            Err(err) => {
                warn!(error = %err, "profile update failed");
                let reason = err.to_string();
                snapshot.state = SyncState::UpdateFailed(reason.clone());
                snapshot.status = SyncStatus::UpdateFailed(reason);
                snapshot.error = Some(err.into());
            }
        })
        .await
        .unwrap_or_else(|current| current)
    }

    async fn begin(&self, start: impl FnOnce(&mut SyncSnapshot)) -> u64 {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        start(&mut inner.snapshot);
        self.publish(&inner);
        inner.generation
    }

    /// Applies `update` if `generation` is still current. A stale result is
    /// dropped and the current snapshot comes back as the error.
    async fn apply(
        &self,
        generation: u64,
        update: impl FnOnce(&mut SyncSnapshot),
    ) -> Result<SyncSnapshot, SyncSnapshot> {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            info!(
                generation,
                current = inner.generation,
                "discarding superseded sync result"
            );
            return Err(inner.snapshot.clone());
        }
        update(&mut inner.snapshot);
        self.publish(&inner);
        Ok(inner.snapshot.clone())
    }

    async fn session_check_failed(&self, generation: u64, err: ProviderError) -> SyncSnapshot {
        warn!(error = %err, "session check failed");
        self.apply(generation, |snapshot| {
            snapshot.sign_out_locally();
            snapshot.status = SyncStatus::SessionCheckFailed;
            snapshot.error = Some(err.into());
        })
        .await
        .unwrap_or_else(|current| current)
    }

    async fn reject_without_session(&self, observed: u64) -> SyncSnapshot {
        self.apply(observed, |snapshot| {
            snapshot.status = SyncStatus::MustSignInFirst;
            snapshot.error = Some(PreconditionError::NoSession.into());
        })
        .await
        .unwrap_or_else(|current| current)
    }

    async fn set_status(&self, status: SyncStatus, error: Option<SyncError>) -> SyncSnapshot {
        let mut inner = self.inner.lock().await;
        inner.snapshot.status = status;
        inner.snapshot.error = error;
        self.publish(&inner);
        inner.snapshot.clone()
    }

    fn publish(&self, inner: &ControllerState) {
        debug!(
            generation = inner.generation,
            state = inner.snapshot.state.name(),
            status = %inner.snapshot.status,
            "sync state published"
        );
        self.snapshots.send_replace(inner.snapshot.clone());
    }
}

impl fmt::Debug for SyncController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncController")
            .field("redirect_to", &self.redirect_to)
            .field("snapshot", &*self.snapshots.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
