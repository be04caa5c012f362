//! Chat command parsing
//!
//! Parsers are pure: they turn one chat line into a typed command. Name
//! lookups and permission gates happen where the command is executed.

pub mod admin;
pub mod user;

pub use admin::AdminCommand;
pub use user::{UserCommand, UserHelp};

use crate::engine::EngineId;

/// Command name (lowercased) and its arguments, if `text` carries `prefix`
pub fn split_command<'a>(text: &'a str, prefix: &str) -> Option<(String, Vec<&'a str>)> {
    let rest = text.trim().strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default().to_lowercase();
    Some((name, words.collect()))
}

fn required<'a>(args: &[&'a str], index: usize, what: &'static str) -> Result<&'a str, CommandError> {
    args.get(index).copied().ok_or(CommandError::MissingArgument(what))
}

fn number<T: std::str::FromStr>(raw: &str) -> Result<T, CommandError> {
    raw.parse().map_err(|_| CommandError::InvalidNumber(raw.to_string()))
}

fn player_id(args: &[&str]) -> Result<EngineId, CommandError> {
    number(required(args, 0, "player id")?)
}

/// Remaining words joined back into one argument
fn rest(args: &[&str], from: usize, what: &'static str) -> Result<String, CommandError> {
    match args.get(from..) {
        Some(words) if !words.is_empty() => Ok(words.join(" ")),
        _ => Err(CommandError::MissingArgument(what)),
    }
}

/// Team by index (`0`..`3`) or colour (`b`lue, `r`ed, `g`reen, `y`ellow)
pub fn parse_team(raw: &str) -> Result<usize, CommandError> {
    match raw.to_lowercase().as_str() {
        "0" | "b" | "blue" => Ok(0),
        "1" | "r" | "red" => Ok(1),
        "2" | "g" | "green" => Ok(2),
        "3" | "y" | "yellow" => Ok(3),
        _ => Err(CommandError::InvalidTeam(raw.to_string())),
    }
}

/// Command faults, reported privately to the issuer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command {0}")]
    Unknown(String),

    #[error("Missing {0}")]
    MissingArgument(&'static str),

    #[error("Invalid number {0}")]
    InvalidNumber(String),

    #[error("You need to specify a team")]
    NoTeam,

    #[error("Invalid team {0}")]
    InvalidTeam(String),

    #[error("You cannot change team when playing")]
    TeamChangeWhilePlaying,

    #[error("Invalid preset name")]
    InvalidPreset,

    #[error("Invalid mod name")]
    InvalidMod,

    #[error("Invalid map name")]
    InvalidMap,

    #[error("No player with id {0}")]
    UnknownPlayer(EngineId),
}
