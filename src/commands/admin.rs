//! Admin chat commands

use super::{number, parse_team, player_id, required, rest, split_command, CommandError};
use crate::engine::EngineId;

/// Commands available to authorized admins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Help,
    Kick { id: EngineId, reason: Option<String> },
    Ban { id: EngineId, reason: Option<String> },
    Mute { id: EngineId },
    /// Select a preset for the next `repeat` games
    Preset { name: String, repeat: usize },
    Mod(String),
    Map(String),
    LoadingTime(u32),
    Team { id: EngineId, team: usize },
    Start,
    Stop,
    Pause,
    Unpause,
    SetVar { name: String, value: String },
    Authorize { id: EngineId },
}

impl AdminCommand {
    /// Parse `text`; `None` when it does not carry the admin prefix
    pub fn parse(text: &str, prefix: &str) -> Option<Result<Self, CommandError>> {
        let (name, args) = split_command(text, prefix)?;
        Some(Self::from_parts(&name, &args))
    }

    fn from_parts(name: &str, args: &[&str]) -> Result<Self, CommandError> {
        let reason = || rest(args, 1, "reason").ok();
        Ok(match name {
            "help" => AdminCommand::Help,
            "kick" => AdminCommand::Kick {
                id: player_id(args)?,
                reason: reason(),
            },
            "ban" => AdminCommand::Ban {
                id: player_id(args)?,
                reason: reason(),
            },
            "mute" => AdminCommand::Mute { id: player_id(args)? },
            "preset" => AdminCommand::Preset {
                name: required(args, 0, "preset name")?.to_string(),
                repeat: match args.get(1) {
                    Some(raw) => number(raw)?,
                    None => 1,
                },
            },
            "mod" => AdminCommand::Mod(rest(args, 0, "mod name")?),
            "map" => AdminCommand::Map(rest(args, 0, "map name")?),
            "lt" => AdminCommand::LoadingTime(number(required(args, 0, "loading time")?)?),
            "team" => AdminCommand::Team {
                id: player_id(args)?,
                team: parse_team(required(args, 1, "team")?)?,
            },
            "start" => AdminCommand::Start,
            "stop" => AdminCommand::Stop,
            "pause" => AdminCommand::Pause,
            "unpause" => AdminCommand::Unpause,
            "setvar" => AdminCommand::SetVar {
                name: required(args, 0, "variable name")?.to_string(),
                value: args.get(1..).map(|v| v.join(" ")).unwrap_or_default(),
            },
            "authorize" => AdminCommand::Authorize { id: player_id(args)? },
            other => return Err(CommandError::Unknown(other.to_string())),
        })
    }
}

const HELP: &[&str] = &[
    "kick playerID [reason]",
    "ban playerID [reason]",
    "mute playerID",
    "preset presetName [repeatCount]",
    "mod modName (or part of name)",
    "map mapName",
    "lt loadingTime",
    "team playerID teamID (0123 or brgy)",
    "start - start game now",
    "stop - go to lobby",
    "pause - pause the session script",
    "unpause - resume the session script",
    "setvar varname value",
    "authorize playerID",
];

/// Admin help, one private message per line
pub fn help_lines(prefix: &str) -> Vec<String> {
    let mut lines = vec!["Admin help:".to_string()];
    lines.extend(HELP.iter().map(|line| format!("{}{}", prefix, line)));
    lines
}
