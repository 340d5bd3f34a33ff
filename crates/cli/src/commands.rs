// Shell command parsing

use needle_core::{BookId, NarrationError, Result};
use std::path::PathBuf;

pub const HELP: &str = "\
commands:
  login <email>          request a one-time code
  verify <email> <code>  sign in with the code
  logout
  books                  list uploaded books
  upload <path>          upload a PDF
  open <book-id>         select a book, resuming at its saved position
  play | pause
  seek <seconds>
  status
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login { email: String },
    Verify { email: String, code: String },
    Logout,
    Books,
    Upload { path: PathBuf },
    Open { book_id: BookId },
    Play,
    Pause,
    Seek { seconds: f64 },
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line; blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (name.to_lowercase().as_str(), args.as_slice()) {
            ("login", [email]) => Command::Login {
                email: email.to_string(),
            },
            ("verify", [email, code]) => Command::Verify {
                email: email.to_string(),
                code: code.to_string(),
            },
            ("logout", []) => Command::Logout,
            ("books" | "ls", []) => Command::Books,
            ("upload", [_, ..]) => Command::Upload {
                path: PathBuf::from(args.join(" ")),
            },
            ("open", [id]) => Command::Open {
                book_id: BookId::new(*id),
            },
            ("play", []) => Command::Play,
            ("pause", []) => Command::Pause,
            ("seek", [seconds]) => Command::Seek {
                seconds: parse_seconds(seconds)?,
            },
            ("status", []) => Command::Status,
            ("help" | "?", []) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            (other, _) => {
                return Err(NarrationError::InvalidArgument(format!(
                    "Unrecognised command '{}'; type 'help'",
                    other
                )))
            }
        };
        Ok(Some(command))
    }
}

/// Accepts plain seconds (`95.5`) or `mm:ss` (`1:35.5`).
fn parse_seconds(text: &str) -> Result<f64> {
    let invalid = || NarrationError::InvalidArgument(format!("'{}' is not a time", text));
    let seconds = match text.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
            let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
            if !(0.0..60.0).contains(&seconds) {
                return Err(invalid());
            }
            minutes as f64 * 60.0 + seconds
        }
        None => text.parse().map_err(|_| invalid())?,
    };
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(seconds)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("   ").unwrap(), None);
        assert_eq!(Command::parse("play").unwrap(), Some(Command::Play));
        assert_eq!(
            Command::parse("verify reader@example.com a1b2").unwrap(),
            Some(Command::Verify {
                email: "reader@example.com".to_string(),
                code: "a1b2".to_string()
            })
        );
        assert_eq!(
            Command::parse("open 6f1c").unwrap(),
            Some(Command::Open {
                book_id: BookId::new("6f1c")
            })
        );
        assert_eq!(
            Command::parse("upload My Book.pdf").unwrap(),
            Some(Command::Upload {
                path: PathBuf::from("My Book.pdf")
            })
        );
    }

    #[test]
    fn test_parse_seek_times() {
        assert_eq!(
            Command::parse("seek 100").unwrap(),
            Some(Command::Seek { seconds: 100.0 })
        );
        assert_eq!(
            Command::parse("seek 1:30.5").unwrap(),
            Some(Command::Seek { seconds: 90.5 })
        );
        assert!(Command::parse("seek -3").is_err());
        assert!(Command::parse("seek 1:75").is_err());
        assert!(Command::parse("seek soon").is_err());
    }

    #[test]
    fn test_rejects_unknown_and_malformed() {
        assert!(Command::parse("rewind").is_err());
        assert!(Command::parse("login").is_err());
        assert!(Command::parse("play now").is_err());
    }
}
