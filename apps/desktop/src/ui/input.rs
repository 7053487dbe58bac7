//! Parsing of terminal command lines.

use client_core::{EditDraft, SyncSnapshot};

use crate::backend_bridge::commands::BackendCommand;

pub const HELP: &str = "\
commands:
  refresh                        re-check the session and reload the profile
  login <provider>               start sign-in with an identity provider
  callback <redirect-url>        finish sign-in with the URL the browser landed on
  logout                         sign out
  edit <display_name> [avatar]   save the profile; quote names with spaces, \"\" means empty,
                                 an omitted avatar keeps the form value
  show                           print the current view
  help                           print this help
  quit                           exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Backend(BackendCommand),
    Edit {
        display_name: String,
        avatar_url: Option<String>,
    },
    Show,
    Help,
    Quit,
}

/// `Ok(None)` for a blank line. Arguments may be quoted to keep spaces.
pub fn parse_line(line: &str) -> Result<Option<Input>, String> {
    let words = split_args(line)?;
    let Some((command, args)) = words.split_first() else {
        return Ok(None);
    };
    let input = match (command.to_ascii_lowercase().as_str(), args) {
        ("refresh", []) => Input::Backend(BackendCommand::Refresh),
        ("login", [provider]) => Input::Backend(BackendCommand::Login {
            provider_id: provider.clone(),
        }),
        ("callback", [url]) => Input::Backend(BackendCommand::Callback {
            redirect_url: url.clone(),
        }),
        ("logout", []) => Input::Backend(BackendCommand::Logout),
        ("edit", [name]) => Input::Edit {
            display_name: name.clone(),
            avatar_url: None,
        },
        ("edit", [name, avatar]) => Input::Edit {
            display_name: name.clone(),
            avatar_url: Some(avatar.clone()),
        },
        ("show", []) => Input::Show,
        ("help" | "?", []) => Input::Help,
        ("quit" | "exit", []) => Input::Quit,
        ("login", _) => return Err("usage: login <provider>".to_string()),
        ("callback", _) => return Err("usage: callback <redirect-url>".to_string()),
        ("edit", _) => return Err("usage: edit <display_name> [avatar_url]".to_string()),
        (other, _) => return Err(format!("unknown command `{other}`; type `help`")),
    };
    Ok(Some(input))
}

/// Builds the draft to submit. A missing avatar keeps what the form holds.
pub fn edit_draft(
    display_name: String,
    avatar_url: Option<String>,
    last: Option<&SyncSnapshot>,
) -> EditDraft {
    let avatar_url = avatar_url
        .or_else(|| last.and_then(|snapshot| snapshot.edit.avatar_url.clone()))
        .unwrap_or_default();
    EditDraft::new(display_name, avatar_url)
}

/// Splits on whitespace; single or double quotes group words, and `""`
/// is an empty argument.
fn split_args(line: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    for ch in line.chars() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }
    if let Some(open) = quote {
        return Err(format!("unterminated {open} quote"));
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}
