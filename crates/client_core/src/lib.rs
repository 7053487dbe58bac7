//! Client side of profile sync: session detection, profile fetch and edit,
//! and the controller that keeps them consistent for a view.

pub mod config;
pub mod controller;
pub mod error;
pub mod gotrue;
pub mod profile_client;
pub mod projection;
pub mod session;

pub use config::ClientConfig;
pub use controller::{SyncCommand, SyncController, SyncSnapshot, SyncState, SyncStatus};
pub use error::{ConfigError, PreconditionError, ProviderError, SyncError, TransportError};
pub use gotrue::{GoTrueSessionProvider, LogLauncher, SignInLauncher};
pub use profile_client::{HttpProfileClient, ProfileClient};
pub use projection::{project, EditDraft, ProfileView};
pub use session::{IdentityClaims, Session, SessionProvider, SignInOptions};
