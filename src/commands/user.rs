//! User chat commands

use super::{number, parse_team, player_id, required, rest, split_command, CommandError};
use crate::engine::EngineId;

/// Commands available to every player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Help,
    Team(usize),
    TopRank,
    /// Rank of the named player, or of the sender
    Rank(Option<String>),
    RankTotal,
    VoteKick(EngineId),
    VoteMute(EngineId),
    VoteMod(String),
    VoteMap(String),
    VoteLoadingTime(u32),
    VotePreset(String),
    Yes,
    No,
}

impl UserCommand {
    /// Parse `text`; `None` when it does not carry the user prefix
    pub fn parse(text: &str, prefix: &str) -> Option<Result<Self, CommandError>> {
        let (name, args) = split_command(text, prefix)?;
        Some(Self::from_parts(&name, &args))
    }

    fn from_parts(name: &str, args: &[&str]) -> Result<Self, CommandError> {
        Ok(match name {
            "help" => UserCommand::Help,
            "team" => UserCommand::Team(parse_team(args.first().ok_or(CommandError::NoTeam)?)?),
            "toprank" => UserCommand::TopRank,
            "rank" => UserCommand::Rank(rest(args, 0, "name").ok()),
            "ranktotal" => UserCommand::RankTotal,
            "kick" => UserCommand::VoteKick(player_id(args)?),
            "mute" => UserCommand::VoteMute(player_id(args)?),
            "mod" => UserCommand::VoteMod(rest(args, 0, "mod name")?),
            "map" => UserCommand::VoteMap(rest(args, 0, "map name")?),
            "lt" => UserCommand::VoteLoadingTime(number(required(args, 0, "loading time")?)?),
            "preset" => UserCommand::VotePreset(required(args, 0, "preset name")?.to_string()),
            "y" | "yes" => UserCommand::Yes,
            "n" | "no" => UserCommand::No,
            other => return Err(CommandError::Unknown(other.to_string())),
        })
    }

    /// Vote proposals and casts, gated on voting being enabled
    pub fn needs_voting(&self) -> bool {
        matches!(
            self,
            UserCommand::VoteKick(_)
                | UserCommand::VoteMute(_)
                | UserCommand::VoteMod(_)
                | UserCommand::VoteMap(_)
                | UserCommand::VoteLoadingTime(_)
                | UserCommand::VotePreset(_)
                | UserCommand::Yes
                | UserCommand::No
        )
    }

    pub fn needs_ranking(&self) -> bool {
        matches!(
            self,
            UserCommand::TopRank | UserCommand::Rank(_) | UserCommand::RankTotal
        )
    }
}

/// Features that decide which help lines a player sees
#[derive(Debug, Clone)]
pub struct UserHelp {
    pub allow_team_change: bool,
    pub max_teams: usize,
    pub ranking: bool,
    pub voting: bool,
}

impl UserHelp {
    /// User help, one private message per line
    pub fn lines(&self, prefix: &str) -> Vec<String> {
        let mut lines = Vec::new();
        if self.allow_team_change {
            let colours = ["b", "r", "g", "y"];
            let teams = colours[..self.max_teams.clamp(1, colours.len())].join("/");
            lines.push(format!("{}team [{}] - set your team", prefix, teams));
        }
        if self.ranking {
            lines.push(format!("{}toprank - display the best players", prefix));
            lines.push(format!("{}rank [name] - display your or other player rank", prefix));
            lines.push(format!(
                "{}ranktotal - display the number of players in the ranking",
                prefix
            ));
        }
        if self.voting {
            lines.push(format!("{}kick playerID - add vote to kick player", prefix));
            lines.push(format!("{}mute playerID - add vote", prefix));
            lines.push(format!("{}preset presetName - add vote", prefix));
            lines.push(format!("{}mod modName (or part of name) - add vote", prefix));
            lines.push(format!("{}map mapName - add vote", prefix));
            lines.push(format!("{}lt loadingTime - add vote", prefix));
            lines.push(format!("{0}y / {0}n - vote yes / no", prefix));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<UserCommand, CommandError> {
        UserCommand::parse(text, "!").expect("user prefix")
    }

    #[test]
    fn test_team_selection() {
        assert_eq!(parse("!team b"), Ok(UserCommand::Team(0)));
        assert_eq!(parse("!TEAM yellow"), Ok(UserCommand::Team(3)));
        assert_eq!(parse("!team"), Err(CommandError::NoTeam));
    }

    #[test]
    fn test_rank_queries() {
        assert_eq!(parse("!rank"), Ok(UserCommand::Rank(None)));
        assert_eq!(
            parse("!rank Mike the worm"),
            Ok(UserCommand::Rank(Some("Mike the worm".to_string())))
        );
        assert!(parse("!toprank").unwrap().needs_ranking());
    }

    #[test]
    fn test_vote_commands() {
        assert_eq!(parse("!kick 4"), Ok(UserCommand::VoteKick(4)));
        assert_eq!(parse("!lt 70"), Ok(UserCommand::VoteLoadingTime(70)));
        assert_eq!(parse("!map dirt"), Ok(UserCommand::VoteMap("dirt".to_string())));
        assert_eq!(parse("!Y"), Ok(UserCommand::Yes));
        assert_eq!(parse("!no"), Ok(UserCommand::No));
        assert!(parse("!n").unwrap().needs_voting());
        assert!(!parse("!help").unwrap().needs_voting());
        assert_eq!(parse("!lt soon"), Err(CommandError::InvalidNumber("soon".to_string())));
    }

    #[test]
    fn test_help_follows_features() {
        let help = UserHelp {
            allow_team_change: true,
            max_teams: 3,
            ranking: false,
            voting: true,
        };
        let lines = help.lines("!");
        assert_eq!(lines[0], "!team [b/r/g] - set your team");
        assert!(!lines.iter().any(|l| l.contains("rank")));
        assert_eq!(lines.last().unwrap(), "!y / !n - vote yes / no");
    }
}
