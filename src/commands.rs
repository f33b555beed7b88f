use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::thread;

/// Interactive controls accepted on stdin in live mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Load(PathBuf),
    Resize { width: u32, height: u32 },
    Status,
    Quit,
}

pub const HELP: &str = "commands: start | stop | load <path> | resize <width> <height> | status | quit";

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "start" | "play" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "status" => Ok(Command::Status),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            "load" | "open" => {
                if rest.is_empty() {
                    Err("load needs a file path".into())
                } else {
                    Ok(Command::Load(PathBuf::from(rest)))
                }
            }
            "resize" => {
                let mut dims = rest.split_whitespace().map(str::parse::<u32>);
                match (dims.next(), dims.next(), dims.next()) {
                    (Some(Ok(width)), Some(Ok(height)), None) => Ok(Command::Resize { width, height }),
                    _ => Err("resize needs <width> <height>".into()),
                }
            }
            "" => Err("empty command".into()),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

/// Forward parsed stdin lines to `sender` from a background thread. EOF is
/// sent as `Quit`.
pub fn spawn_stdin_reader(sender: Sender<Command>) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name("stdin".into()).spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match Command::parse(&line) {
                Ok(cmd) => {
                    if sender.send(cmd).is_err() {
                        return;
                    }
                }
                Err(msg) => eprintln!("{}. {}", msg, HELP),
            }
        }
        let _ = sender.send(Command::Quit);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_commands() {
        assert_eq!(Command::parse("start"), Ok(Command::Start));
        assert_eq!(Command::parse("  STOP "), Ok(Command::Stop));
        assert_eq!(Command::parse("q"), Ok(Command::Quit));
        assert_eq!(Command::parse("status"), Ok(Command::Status));
    }

    #[test]
    fn load_keeps_spaces_in_path() {
        assert_eq!(
            Command::parse("load  My Music/track one.flac"),
            Ok(Command::Load(PathBuf::from("My Music/track one.flac")))
        );
        assert!(Command::parse("load").is_err());
    }

    #[test]
    fn resize_needs_two_numbers() {
        assert_eq!(
            Command::parse("resize 800 600"),
            Ok(Command::Resize {
                width: 800,
                height: 600
            })
        );
        assert!(Command::parse("resize 800").is_err());
        assert!(Command::parse("resize 800 x").is_err());
        assert!(Command::parse("resize 1 2 3").is_err());
    }

    #[test]
    fn rejects_unknown_and_empty() {
        assert_eq!(
            Command::parse("dance"),
            Err("unknown command 'dance'".to_string())
        );
        assert!(Command::parse("   ").is_err());
    }
}
