//! Slash commands for interactive mode

use std::path::PathBuf;

/// A parsed slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Summarize the open page
    Summarize,
    /// Translate the current selection
    Translate,
    /// Set the page selection
    Select(String),
    /// Open an HTML file as the current page
    Open(PathBuf),
    /// Show the model status
    Status,
    /// Ask the background to load the model
    Load,
    /// Clear the conversation (after confirmation)
    Clear,
    /// Print the conversation
    History,
    /// Show a message to the user
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse a slash command. Returns `None` for ordinary chat input.
pub fn parse_command(input: &str) -> Option<Command> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let (command, args) = match rest.split_once(char::is_whitespace) {
        Some((command, args)) => (command.to_lowercase(), args.trim()),
        None => (rest.to_lowercase(), ""),
    };

    Some(match command.as_str() {
        "help" | "h" | "?" => Command::Message(help_message()),

        "summarize" | "sum" => Command::Summarize,

        "translate" | "tr" => Command::Translate,

        "select" | "sel" => Command::Select(args.to_string()),

        "open" | "o" if args.is_empty() => Command::Message("Usage: /open <file.html>".to_string()),
        "open" | "o" => Command::Open(PathBuf::from(args)),

        "status" => Command::Status,

        "load" => Command::Load,

        "clear" | "c" => Command::Clear,

        "history" => Command::History,

        "quit" | "exit" | "q" => Command::Exit,

        _ => Command::Unknown(command),
    })
}

/// Whether an answer to a y/N prompt is a yes
pub fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?          Show this help message
  /summarize, /sum       Summarize the open page
  /translate, /tr        Translate the current selection
  /select <text>         Set the selection (empty clears it)
  /open, /o <file>       Open an HTML file as the current page
  /status                Show model status
  /load                  Load the model if it is not loaded
  /clear, /c             Clear conversation history (asks first)
  /history               Print the conversation
  /quit, /exit, /q       Exit pagemind

Anything else is sent to the model as a chat message."#
        .to_string()
}
