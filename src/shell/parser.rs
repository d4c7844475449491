//! Command protocol parser
//!
//! One line of text in, one `Command` out. The protocol is closed: eight
//! commands exist, and anything else is an unknown-command error rather than
//! a silent no-op. `write` keeps the remainder of the line as data verbatim,
//! so file content may contain spaces.

use std::fmt;

/// A parsed protocol command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Poke the kernel with a greeting print
    Run,
    /// Write `data` to `name` in the root directory
    Write { name: String, data: String },
    /// Read a file back
    Read { name: String },
    /// Show the first bytes of machine memory
    Memory,
    /// List the root directory
    ListFiles,
    /// Register an app
    CreateApp { name: String },
    /// Launch a registered app
    RunApp { name: String },
    /// Bring the machine down
    Shutdown,
}

/// Parse error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Blank input line
    EmptyCommand,
    /// Not one of the protocol's commands
    UnknownCommand(String),
    /// A known command is missing a required argument
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::EmptyCommand => write!(f, "empty command"),
            ParseError::UnknownCommand(line) => write!(f, "unknown command: {}", line),
            ParseError::MissingArgument { command, argument } => {
                write!(f, "{}: missing {}", command, argument)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse one protocol line
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::EmptyCommand);
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim_start()),
        None => (line, ""),
    };

    match head {
        "run" if rest.is_empty() => Ok(Command::Run),
        "memory" if rest.is_empty() => Ok(Command::Memory),
        "list_files" if rest.is_empty() => Ok(Command::ListFiles),
        "shutdown" if rest.is_empty() => Ok(Command::Shutdown),
        "write" => {
            let (name, data) = rest.split_once(char::is_whitespace).ok_or({
                ParseError::MissingArgument {
                    command: "write",
                    argument: if rest.is_empty() { "filename" } else { "data" },
                }
            })?;
            Ok(Command::Write {
                name: name.to_string(),
                data: data.trim_start().to_string(),
            })
        }
        "read" => one_arg(rest, "read", "filename").map(|name| Command::Read { name }),
        "create_app" => one_arg(rest, "create_app", "name").map(|name| Command::CreateApp { name }),
        "run_app" => one_arg(rest, "run_app", "name").map(|name| Command::RunApp { name }),
        _ => Err(ParseError::UnknownCommand(line.to_string())),
    }
}

/// The whole remainder of the line is the one argument
fn one_arg(
    rest: &str,
    command: &'static str,
    argument: &'static str,
) -> Result<String, ParseError> {
    if rest.is_empty() {
        Err(ParseError::MissingArgument { command, argument })
    } else {
        Ok(rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_commands() {
        assert_eq!(parse("run"), Ok(Command::Run));
        assert_eq!(parse("memory"), Ok(Command::Memory));
        assert_eq!(parse("list_files"), Ok(Command::ListFiles));
        assert_eq!(parse("shutdown"), Ok(Command::Shutdown));
    }

    #[test]
    fn test_write_keeps_data_verbatim() {
        assert_eq!(
            parse("write notes.txt hello there  world"),
            Ok(Command::Write {
                name: "notes.txt".to_string(),
                data: "hello there  world".to_string(),
            })
        );
    }

    #[test]
    fn test_write_missing_arguments() {
        assert_eq!(
            parse("write"),
            Err(ParseError::MissingArgument {
                command: "write",
                argument: "filename"
            })
        );
        assert_eq!(
            parse("write a.txt"),
            Err(ParseError::MissingArgument {
                command: "write",
                argument: "data"
            })
        );
    }

    #[test]
    fn test_read_and_app_commands() {
        assert_eq!(
            parse("read a.txt"),
            Ok(Command::Read {
                name: "a.txt".to_string()
            })
        );
        assert_eq!(
            parse("create_app browser"),
            Ok(Command::CreateApp {
                name: "browser".to_string()
            })
        );
        assert_eq!(
            parse("run_app browser"),
            Ok(Command::RunApp {
                name: "browser".to_string()
            })
        );
    }

    #[test]
    fn test_missing_single_argument() {
        assert_eq!(
            parse("read"),
            Err(ParseError::MissingArgument {
                command: "read",
                argument: "filename"
            })
        );
        assert_eq!(
            parse("run_app"),
            Err(ParseError::MissingArgument {
                command: "run_app",
                argument: "name"
            })
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse("reboot"),
            Err(ParseError::UnknownCommand("reboot".to_string()))
        );
        // Trailing junk after a bare command is not that command
        assert_eq!(
            parse("run fast"),
            Err(ParseError::UnknownCommand("run fast".to_string()))
        );
    }

    #[test]
    fn test_empty_line() {
        assert_eq!(parse(""), Err(ParseError::EmptyCommand));
        assert_eq!(parse("   "), Err(ParseError::EmptyCommand));
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert_eq!(parse("  run  "), Ok(Command::Run));
        assert_eq!(
            parse("  read  a.txt "),
            Ok(Command::Read {
                name: "a.txt".to_string()
            })
        );
    }
}
