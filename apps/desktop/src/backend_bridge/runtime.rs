//! Backend worker: owns the tokio runtime and the sync controller, runs one
//! task per queued command and forwards every published snapshot to the UI.

use std::{sync::Arc, thread};

use client_core::{
    gotrue::Url, ClientConfig, GoTrueSessionProvider, HttpProfileClient, ProviderError,
    SignInLauncher, SyncController, SyncSnapshot,
};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use futures::{Stream, StreamExt};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};

/// Hands the authorize URL to the terminal instead of a browser.
pub struct ChannelLauncher {
    ui_tx: Sender<UiEvent>,
}

impl ChannelLauncher {
    pub fn new(ui_tx: Sender<UiEvent>) -> Self {
        Self { ui_tx }
    }
}

impl SignInLauncher for ChannelLauncher {
    fn launch(&self, provider_id: &str, authorize_url: &Url) -> Result<(), ProviderError> {
        match self.ui_tx.try_send(UiEvent::AuthorizeUrl {
            provider_id: provider_id.to_string(),
            url: authorize_url.to_string(),
        }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ProviderError::new("UI event queue is full")),
            Err(TrySendError::Disconnected(_)) => Err(ProviderError::new("UI is not listening")),
        }
    }
}

/// Blocks on a full UI queue instead of dropping, so the last published
/// snapshot always reaches the screen.
fn forward_snapshots(
    mut updates: impl Stream<Item = SyncSnapshot> + Unpin + Send + 'static,
    ui_tx: Sender<UiEvent>,
) -> tokio::task::JoinHandle<()> {
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || {
        while let Some(snapshot) = handle.block_on(updates.next()) {
            if ui_tx.send(UiEvent::Snapshot(snapshot)).is_err() {
                break;
            }
        }
    })
}

pub fn launch(
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
    config: ClientConfig,
    access_token: Option<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let provider = Arc::new(
                GoTrueSessionProvider::from_config(&config)
                    .with_launcher(Arc::new(ChannelLauncher::new(ui_tx.clone()))),
            );
            if let Some(token) = access_token.as_deref() {
                if let Err(err) = provider.with_access_token(token).await {
                    tracing::warn!(error = %err, "ignoring access token from command line");
                    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                        UiErrorContext::BackendStartup,
                        format!("access token rejected: {err}"),
                    )));
                }
            }
            let controller = Arc::new(SyncController::new(
                provider.clone(),
                Arc::new(HttpProfileClient::new(config.backend_url.clone())),
                config.redirect_url.clone(),
            ));

            forward_snapshots(controller.updates(), ui_tx.clone());

            let _ = ui_tx.try_send(UiEvent::Info("backend worker ready".to_string()));
            tokio::spawn({
                let controller = controller.clone();
                async move {
                    controller.bootstrap().await;
                }
            });

            while let Ok(cmd) = cmd_rx.recv() {
                tracing::info!(command = cmd.name(), "backend: command received");
                let controller = controller.clone();
                let provider = provider.clone();
                let ui_tx = ui_tx.clone();
                tokio::spawn(async move {
                    if let BackendCommand::Callback { redirect_url } = &cmd {
                        if let Err(err) = provider.restore_from_redirect(redirect_url).await {
                            tracing::warn!(error = %err, "sign-in callback rejected");
                            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                                UiErrorContext::SignIn,
                                err.to_string(),
                            )));
                            return;
                        }
                    }
                    controller.dispatch(cmd.into_sync_command()).await;
                });
            }
            tracing::info!("backend: command queue closed, worker stopping");
        });
    })
}
