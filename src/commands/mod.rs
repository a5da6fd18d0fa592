//! Slash-command parsing and execution for the chat input line.
//!
//! Commands that only touch local state are handled here directly; commands
//! that need the transport return a [`CommandResult`] variant the event
//! loop turns into a spawned call. Anything that does not parse as a
//! command is sent as a chat message.

use crate::core::app::App;

const HELP_TEXT: &str = "\
Commands:
  /help             Show this help
  /clear            Clear the conversation (starts a fresh session)
  /delete <index>   Delete message <index> (0-based; deleting a user turn also removes its reply)
  /export [file]    Save the conversation to a JSON file
  /import <file>    Load a previously exported conversation
  /model [name]     Switch model, or list server models when no name is given
  /log [file]       Log the conversation to a file; bare /log pauses or resumes
  /quit             Exit

Keys: Enter sends, Esc cancels the pending response or skips the typing \
animation, Ctrl+C quits, Up/Down or the mouse wheel scrolls.";

#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Command handled locally; nothing else to do.
    Continue,
    /// Not a command: send it as a chat message.
    ProcessAsMessage(String),
    Clear,
    Delete(usize),
    Export(Option<String>),
    Import(String),
    SetModel(String),
    ListModels,
    Quit,
}

pub fn process_input(app: &mut App, input: &str) -> CommandResult {
    let trimmed = input.trim();

    if !trimmed.starts_with('/') {
        return CommandResult::ProcessAsMessage(input.to_string());
    }

    let mut parts = trimmed[1..].splitn(2, ' ');
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    match command_name {
        "help" => {
            app.add_app_info(HELP_TEXT);
            CommandResult::Continue
        }
        "clear" => CommandResult::Clear,
        "delete" => handle_delete(app, args),
        "export" => {
            if args.is_empty() {
                CommandResult::Export(None)
            } else {
                CommandResult::Export(Some(args.to_string()))
            }
        }
        "import" => {
            if args.is_empty() {
                app.set_status("Usage: /import <file>");
                CommandResult::Continue
            } else {
                CommandResult::Import(args.to_string())
            }
        }
        "model" => {
            if args.is_empty() {
                CommandResult::ListModels
            } else {
                CommandResult::SetModel(args.to_string())
            }
        }
        "log" => handle_log(app, args),
        "quit" | "exit" => CommandResult::Quit,
        // Unknown commands fall through as chat text, matching the input box
        // behavior for anything that merely looks like a command.
        _ => CommandResult::ProcessAsMessage(input.to_string()),
    }
}

fn handle_delete(app: &mut App, args: &str) -> CommandResult {
    let Ok(index) = args.parse::<usize>() else {
        app.set_status("Usage: /delete <index>");
        return CommandResult::Continue;
    };
    if index >= app.conversation_len() {
        app.set_status(format!(
            "Message index out of range (conversation has {} messages)",
            app.conversation_len()
        ));
        return CommandResult::Continue;
    }
    CommandResult::Delete(index)
}

fn handle_log(app: &mut App, args: &str) -> CommandResult {
    let result = if args.is_empty() {
        app.logging.toggle_logging()
    } else {
        app.logging.set_log_file(args.to_string())
    };
    match result {
        Ok(message) => app.set_status(message),
        Err(e) => app.set_status(format!("Log error: {e}")),
    }
    CommandResult::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Message;
    use crate::render::animate::AnimationOptions;
    use crate::utils::logging::LoggingState;

    fn test_app() -> App {
        App::new(
            "test-model".to_string(),
            LoggingState::new(None).expect("logging"),
            AnimationOptions::default(),
        )
    }

    #[test]
    fn plain_text_is_a_message() {
        let mut app = test_app();
        assert_eq!(
            process_input(&mut app, "hello there"),
            CommandResult::ProcessAsMessage("hello there".to_string())
        );
    }

    #[test]
    fn unknown_commands_fall_through_as_text() {
        let mut app = test_app();
        assert_eq!(
            process_input(&mut app, "/frobnicate now"),
            CommandResult::ProcessAsMessage("/frobnicate now".to_string())
        );
    }

    #[test]
    fn help_appends_a_notice() {
        let mut app = test_app();
        assert_eq!(process_input(&mut app, "/help"), CommandResult::Continue);
        assert!(app.messages.iter().any(|m| m.content.contains("/delete")));
    }

    #[test]
    fn delete_validates_its_index() {
        let mut app = test_app();
        app.messages.push_back(Message::user("only one"));

        assert_eq!(
            process_input(&mut app, "/delete 0"),
            CommandResult::Delete(0)
        );
        assert_eq!(process_input(&mut app, "/delete 5"), CommandResult::Continue);
        assert!(app.status.as_deref().is_some_and(|s| s.contains("range")));
        assert_eq!(
            process_input(&mut app, "/delete soon"),
            CommandResult::Continue
        );
    }

    #[test]
    fn export_and_import_carry_their_paths() {
        let mut app = test_app();
        assert_eq!(
            process_input(&mut app, "/export"),
            CommandResult::Export(None)
        );
        assert_eq!(
            process_input(&mut app, "/export out.json"),
            CommandResult::Export(Some("out.json".to_string()))
        );
        assert_eq!(
            process_input(&mut app, "/import saved.json"),
            CommandResult::Import("saved.json".to_string())
        );
        assert_eq!(process_input(&mut app, "/import"), CommandResult::Continue);
    }

    #[test]
    fn model_lists_or_sets() {
        let mut app = test_app();
        assert_eq!(process_input(&mut app, "/model"), CommandResult::ListModels);
        assert_eq!(
            process_input(&mut app, "/model gemini-2.0-pro"),
            CommandResult::SetModel("gemini-2.0-pro".to_string())
        );
    }

    #[test]
    fn quit_variants() {
        let mut app = test_app();
        assert_eq!(process_input(&mut app, "/quit"), CommandResult::Quit);
        assert_eq!(process_input(&mut app, "/exit"), CommandResult::Quit);
    }
}
