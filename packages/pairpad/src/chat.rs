//! `pairpad chat`: terminal chat panel next to an in-memory editor buffer.
//!
//! Renders from the session store and connection state; user input is read
//! line by line from stdin. The user changes the buffer with `/edit` or
//! `/reload`; the assistant changes it through its replies.

use std::sync::Arc;

use anyhow::Result;
use pairpad_session::{
    ConnectionManager, ConnectionState, ConversationEntry, ManagerConfig, OutboundRequest, Role,
    SendError, SessionIdProvider, WsConnector,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::editor::{EditorBuffer, edit_externally, editor_command};
use crate::input::StdinLines;

/// One line of user input, interpreted.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Message(String),
    Show,
    Edit,
    Reload,
    Path(String),
    Status,
    Reconnect,
    Quit,
    Blank,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Blank;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match name {
        "show" => Input::Show,
        "edit" => Input::Edit,
        "reload" => Input::Reload,
        "path" if !arg.is_empty() => Input::Path(arg.to_string()),
        "status" => Input::Status,
        "reconnect" => Input::Reconnect,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(trimmed.to_string()),
    }
}

fn status_line(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connected => "● Connected",
        ConnectionState::Connecting => "◌ Connecting...",
        ConnectionState::Disconnected => "○ Disconnected",
    }
}

fn render_entry(entry: &ConversationEntry) -> String {
    let who = match entry.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    let mut out = String::new();
    for (i, line) in entry.content.lines().enumerate() {
        if i == 0 {
            out.push_str(&format!("{who:>9} │ {line}\n"));
        } else {
            out.push_str(&format!("{:>9} │ {line}\n", ""));
        }
    }
    if out.is_empty() {
        out.push_str(&format!("{who:>9} │\n"));
    }
    out
}

fn send_error_hint(err: &SendError) -> &'static str {
    match err {
        SendError::NotConnected => "not connected; waiting for the assistant service",
        SendError::AlreadyInFlight => "still waiting for the previous reply",
        SendError::Codec(_) => "nothing to send",
    }
}

pub async fn run_chat(config: ManagerConfig, buffer: EditorBuffer) -> Result<()> {
    let provider = SessionIdProvider::new();
    let editor = Arc::new(Mutex::new(buffer));

    let sink = editor.clone();
    let manager = ConnectionManager::new(WsConnector, provider.get().clone(), config)?
        .with_file_update(move |content| sink.lock().replace(content));

    eprintln!("pairpad session {}", manager.session_id());
    eprintln!("endpoint: {}", manager.endpoint());
    eprintln!(
        "Type a message and press Enter. /show /edit /reload /path <p> /status /reconnect /quit"
    );

    manager.open();

    let mut state_rx = manager.watch_state();
    let mut store_rx = manager.store().subscribe();
    let mut lines = StdinLines::spawn();
    let mut rendered = 0usize;
    let mut seen_revision = 0u64;

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                eprintln!("[{}]", status_line(state));
            }

            changed = store_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = store_rx.borrow_and_update().clone();
                for entry in &snapshot.entries[rendered..] {
                    // The user's own lines are already on screen.
                    if entry.role == Role::Assistant {
                        print!("{}", render_entry(entry));
                    }
                }
                rendered = snapshot.entries.len();
                if snapshot.is_loading {
                    eprintln!("  ...");
                }

                let (revision, lines_now) = {
                    let buf = editor.lock();
                    (buf.revision, buf.line_count())
                };
                if revision != seen_revision {
                    seen_revision = revision;
                    eprintln!("[buffer updated by assistant: {lines_now} lines, /show to view]");
                }
            }

            line = lines.next_line() => {
                let Some(line) = line else {
                    break;
                };
                match parse_input(&line) {
                    Input::Quit => break,
                    Input::Blank => {}
                    Input::Show => {
                        let buf = editor.lock();
                        println!("── {} ──", buf.path);
                        print!("{}", buf.content);
                        if !buf.content.ends_with('\n') {
                            println!();
                        }
                        println!("──");
                    }
                    Input::Edit => {
                        if manager.is_loading() {
                            eprintln!("! wait for the assistant's reply before editing");
                            continue;
                        }
                        let snapshot = editor.lock().clone();
                        lines.pause();
                        let edited = edit_externally(&editor_command(), &snapshot).await;
                        lines.resume();
                        match edited {
                            Ok(Some(content)) => {
                                let mut buf = editor.lock();
                                buf.replace(&content);
                                seen_revision = buf.revision;
                                eprintln!("[buffer updated: {} lines]", buf.line_count());
                            }
                            Ok(None) => eprintln!("[buffer unchanged]"),
                            Err(e) => {
                                warn!(error = %e, "external edit failed");
                                eprintln!("! {e:#}");
                            }
                        }
                    }
                    Input::Reload => {
                        let mut buf = editor.lock();
                        match buf.reload() {
                            Ok(()) => {
                                seen_revision = buf.revision;
                                eprintln!("[buffer reloaded: {} lines]", buf.line_count());
                            }
                            Err(e) => eprintln!("! {e:#}"),
                        }
                    }
                    Input::Path(path) => {
                        editor.lock().path = path.clone();
                        eprintln!("file path set to {path}");
                    }
                    Input::Status => {
                        let view = manager.view();
                        eprintln!(
                            "[{}] {} messages{}",
                            status_line(manager.state()),
                            view.entries.len(),
                            if view.is_loading { ", waiting for reply" } else { "" }
                        );
                    }
                    Input::Reconnect => {
                        manager.close();
                        manager.open();
                    }
                    Input::Unknown(cmd) => eprintln!("unknown command: {cmd}"),
                    Input::Message(message) => {
                        let (content, path) = {
                            let buf = editor.lock();
                            (buf.content.clone(), buf.path.clone())
                        };
                        let result = OutboundRequest::new(message, content, path)
                            .map_err(SendError::from)
                            .and_then(|request| manager.send(request));
                        if let Err(e) = result {
                            debug!(error = %e, "send refused");
                            eprintln!("! {}", send_error_hint(&e));
                        }
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    manager.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message_sent_as_typed() {
        assert_eq!(
            parse_input("  add a docstring "),
            Input::Message("  add a docstring ".to_string())
        );
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse_input("   "), Input::Blank);
    }

    #[test]
    fn commands() {
        assert_eq!(parse_input("/show"), Input::Show);
        assert_eq!(parse_input("/edit"), Input::Edit);
        assert_eq!(parse_input("/reload"), Input::Reload);
        assert_eq!(parse_input("/path src/app.py"), Input::Path("src/app.py".to_string()));
        assert_eq!(parse_input("/status"), Input::Status);
        assert_eq!(parse_input("/reconnect"), Input::Reconnect);
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input("/path"), Input::Unknown("/path".to_string()));
        assert_eq!(parse_input("/nope"), Input::Unknown("/nope".to_string()));
    }

    #[test]
    fn multi_line_entries_are_indented() {
        let out = render_entry(&ConversationEntry::assistant("first\nsecond"));
        assert_eq!(out, "assistant │ first\n          │ second\n");
    }

    #[test]
    fn empty_entry_still_renders() {
        let out = render_entry(&ConversationEntry::assistant(""));
        assert_eq!(out, "assistant │\n");
    }

    #[test]
    fn status_indicator() {
        assert!(status_line(ConnectionState::Connected).contains("Connected"));
        assert!(status_line(ConnectionState::Disconnected).contains("Disconnected"));
    }
}
