//! Slash commands understood by the prompt loop.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Clear,
    Model(Option<String>),
    Stats,
    File(String),
    History,
    Help,
    Exit,
    Unknown(String),
}

impl Command {
    /// Parse a line starting with `/`. Plain chat input yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let rest = line.strip_prefix('/')?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let arg = (!arg.is_empty()).then(|| arg.to_string());

        let command = match name.to_ascii_lowercase().as_str() {
            "clear" | "new" => Command::Clear,
            "model" => Command::Model(arg),
            "stats" => Command::Stats,
            "file" => match arg {
                Some(path) => Command::File(path),
                None => Command::Unknown("/file needs a path".to_string()),
            },
            "history" => Command::History,
            "help" | "?" => Command::Help,
            "exit" | "quit" => Command::Exit,
            other => Command::Unknown(format!("unknown command /{}", other)),
        };
        Some(command)
    }
}

pub const HELP: &str = "\
/clear            save and start a new conversation
/model [alias]    show or switch the model
/stats            session analytics and context health
/file <path>      add a file to the conversation
/history          list saved conversations
/help             this text
/exit             leave";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_input_is_not_a_command() {
        assert_eq!(Command::parse("hello /model"), None);
    }

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            Command::parse("/model  llama "),
            Some(Command::Model(Some("llama".to_string())))
        );
        assert_eq!(Command::parse("/model"), Some(Command::Model(None)));
        assert_eq!(
            Command::parse("/file src/main.rs"),
            Some(Command::File("src/main.rs".to_string()))
        );
        assert_eq!(Command::parse("/QUIT"), Some(Command::Exit));
    }

    #[test]
    fn file_without_path_is_rejected() {
        assert!(matches!(Command::parse("/file"), Some(Command::Unknown(_))));
        assert!(matches!(Command::parse("/bogus"), Some(Command::Unknown(_))));
    }
}
