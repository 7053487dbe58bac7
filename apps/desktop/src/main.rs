use std::{
    io::{self, BufRead},
    path::PathBuf,
    thread,
};

mod backend_bridge;
mod controller;
mod ui;

use anyhow::Result;
use clap::Parser;
use client_core::{ClientConfig, SyncError, SyncSnapshot};
use crossbeam_channel::{bounded, select, Receiver};
use tracing_subscriber::EnvFilter;

use backend_bridge::{commands::BackendCommand, runtime};
use controller::{
    events::{UiError, UiEvent},
    orchestration::dispatch_backend_command,
};
use ui::{
    input::{edit_draft, parse_line, Input, HELP},
    view::render,
};

const COMMAND_QUEUE_CAPACITY: usize = 64;
const UI_EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "profile-sync", about = "Sign in and edit your profile from the terminal")]
struct Args {
    /// Config file; defaults to ./profile_sync.toml when present.
    #[arg(long, env = "PROFILE_SYNC_CONFIG")]
    config: Option<PathBuf>,
    /// Start with this access token instead of signing in.
    #[arg(long, env = "PROFILE_SYNC_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
    #[arg(long)]
    provider_url: Option<String>,
    #[arg(long)]
    anon_key: Option<String>,
    #[arg(long)]
    backend_url: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();
    let config = load_config(&args).map_err(|err| {
        tracing::error!(error = %err, "cannot start without configuration");
        err
    })?;

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(COMMAND_QUEUE_CAPACITY);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(UI_EVENT_QUEUE_CAPACITY);
    let _worker = runtime::launch(cmd_rx, ui_tx, config, args.access_token.clone());
    let input_rx = spawn_stdin_reader();

    println!("{HELP}");
    let mut last: Option<SyncSnapshot> = None;
    loop {
        select! {
            recv(ui_rx) -> event => match event {
                Ok(UiEvent::Snapshot(snapshot)) => {
                    if last.as_ref() != Some(&snapshot) {
                        println!("\n{}", render(&snapshot));
                    }
                    last = Some(snapshot);
                }
                Ok(UiEvent::AuthorizeUrl { provider_id, url }) => {
                    println!("\nopen this URL to sign in with {provider_id}:\n  {url}");
                    println!("then run `callback <url>` with the address your browser lands on");
                }
                Ok(UiEvent::Info(message)) => tracing::info!("{message}"),
                Ok(UiEvent::Error(err)) => print_error(&err),
                Err(_) => {
                    eprintln!("backend worker stopped");
                    break;
                }
            },
            recv(input_rx) -> line => {
                let Ok(line) = line else { break };
                match parse_line(&line) {
                    Ok(None) => {}
                    Ok(Some(Input::Quit)) => break,
                    Ok(Some(Input::Help)) => println!("{HELP}"),
                    Ok(Some(Input::Show)) => match &last {
                        Some(snapshot) => println!("{}", render(snapshot)),
                        None => println!("no state yet"),
                    },
                    Ok(Some(Input::Edit { display_name, avatar_url })) => {
                        let draft = edit_draft(display_name, avatar_url, last.as_ref());
                        send(&cmd_tx, BackendCommand::Edit { draft });
                    }
                    Ok(Some(Input::Backend(cmd))) => send(&cmd_tx, cmd),
                    Err(usage) => eprintln!("{usage}"),
                }
            }
        }
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<ClientConfig, SyncError> {
    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(url) = &args.provider_url {
        config.provider_url = url.clone();
    }
    if let Some(key) = &args.anon_key {
        config.provider_anon_key = key.clone();
    }
    if let Some(url) = &args.backend_url {
        config.backend_url = url.clone();
    }
    Ok(config.validate()?)
}

fn send(cmd_tx: &crossbeam_channel::Sender<BackendCommand>, cmd: BackendCommand) {
    let mut status = String::new();
    dispatch_backend_command(cmd_tx, cmd, &mut status);
    if !status.is_empty() {
        print_error(&UiError::from_message(
            controller::events::UiErrorContext::General,
            status,
        ));
    }
}

fn print_error(err: &UiError) {
    eprintln!("error ({:?}): {}", err.context(), err.message());
    if let Some(hint) = err.hint() {
        eprintln!("  hint: {hint}");
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = bounded(16);
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
