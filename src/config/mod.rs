//! Configuration module - environment variable parsing

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::game::{VoteCounting, VotePolicy};
use crate::util::rate_limit::CHAT_COMMAND_RATE_LIMIT;
use crate::util::time::parse_secs;

/// Longest accepted timeout; deadlines are computed as `now + duration`
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port passed to `startlobby`, engine default when unset
    pub lobby_port: Option<u16>,

    /// Directory holding preset files
    pub preset_dir: PathBuf,
    /// Directory holding level files
    pub level_dir: PathBuf,
    /// Directory whose sub-directories are mods
    pub mod_dir: PathBuf,

    /// Append-only kill log backing the ranking
    pub ranking_file: PathBuf,
    /// Append-only name/skin registry
    pub auth_file: PathBuf,

    /// Engine variables pushed once at startup
    pub global_settings: Vec<(String, String)>,

    /// Lobby, voting and rotation policy
    pub policy: SessionPolicy,
}

/// Session policy knobs
#[derive(Clone, Debug)]
pub struct SessionPolicy {
    /// Players needed before the lobby counts down to a game
    pub min_players: usize,
    /// Players needed before the game is split into teams
    pub min_players_teams: usize,
    /// Number of teams in use (1..=4)
    pub max_teams: usize,
    /// Players may pick their own team
    pub allow_team_change: bool,
    /// Average ping ceiling in milliseconds
    pub max_ping: u32,

    /// Lobby preset rotation interval
    pub preset_timeout: Duration,
    /// Delay between enough players and game start
    pub wait_before_game: Duration,
    /// Grace period in lobby after a finished game
    pub wait_after_game: Duration,
    /// Minimum interval between "too few players" messages
    pub low_player_warning_interval: Duration,

    pub too_few_players_message: String,
    pub wait_before_game_message: String,
    pub team_change_message: String,

    /// Preset rotation; all discovered presets when empty
    pub presets: Vec<String>,

    pub admin_prefix: String,
    pub user_prefix: String,

    /// Record kills and answer rank queries
    pub ranking: bool,
    /// Bind names to skins and kick impostors
    pub ranking_authentication: bool,

    /// Allow vote proposals from players
    pub voting: bool,
    pub vote: VotePolicy,

    /// How long a kicked player is refused on rejoin (zero disables)
    pub kick_block: Duration,
    /// Chat commands per second per player
    pub command_rate_limit: u32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            min_players: 2,
            min_players_teams: 4,
            max_teams: 2,
            allow_team_change: true,
            max_ping: 400,
            preset_timeout: Duration::from_secs(60),
            wait_before_game: Duration::from_secs(30),
            wait_after_game: Duration::from_secs(10),
            low_player_warning_interval: Duration::from_secs(60),
            too_few_players_message: "Game will start with minimum 2 players".to_string(),
            wait_before_game_message: "Game will start in 30 seconds".to_string(),
            team_change_message: "Set your team with !team b/r".to_string(),
            presets: Vec::new(),
            admin_prefix: "//".to_string(),
            user_prefix: "!".to_string(),
            ranking: true,
            ranking_authentication: false,
            voting: true,
            vote: VotePolicy::default(),
            kick_block: Duration::from_secs(5 * 60),
            command_rate_limit: CHAT_COMMAND_RATE_LIMIT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let defaults = SessionPolicy::default();
        let text = |name: &'static str, default: &str| {
            lookup(name).unwrap_or_else(|| default.to_string())
        };

        let vote = VotePolicy {
            window: secs_or(&lookup, "VOTING_TIME", defaults.vote.window)?,
            percent: parsed_or(&lookup, "VOTING_PERCENT", defaults.vote.percent)?,
            counting: if flag_or(&lookup, "VOTING_COUNT_NEGATIVE", true)? {
                VoteCounting::Net
            } else {
                VoteCounting::YesOnly
            },
        };

        let policy = SessionPolicy {
            min_players: parsed_or(&lookup, "MIN_PLAYERS", defaults.min_players)?,
            min_players_teams: parsed_or(&lookup, "MIN_PLAYERS_TEAMS", defaults.min_players_teams)?,
            max_teams: parsed_or(&lookup, "MAX_TEAMS", defaults.max_teams)?.clamp(1, 4),
            allow_team_change: flag_or(&lookup, "ALLOW_TEAM_CHANGE", defaults.allow_team_change)?,
            max_ping: parsed_or(&lookup, "MAX_PING", defaults.max_ping)?,
            preset_timeout: secs_or(&lookup, "PRESET_TIMEOUT", defaults.preset_timeout)?,
            wait_before_game: secs_or(&lookup, "WAIT_BEFORE_GAME", defaults.wait_before_game)?,
            wait_after_game: secs_or(&lookup, "WAIT_AFTER_GAME", defaults.wait_after_game)?,
            low_player_warning_interval: secs_or(
                &lookup,
                "WAIT_BEFORE_SPAMMING_TOO_FEW_PLAYERS_MESSAGE",
                defaults.low_player_warning_interval,
            )?,
            too_few_players_message: text("TOO_FEW_PLAYERS_MESSAGE", &defaults.too_few_players_message),
            wait_before_game_message: text(
                "WAIT_BEFORE_GAME_MESSAGE",
                &defaults.wait_before_game_message,
            ),
            team_change_message: text("TEAM_CHANGE_MESSAGE", &defaults.team_change_message),
            presets: lookup("PRESETS").map(|v| parse_list(&v)).unwrap_or_default(),
            admin_prefix: text("ADMIN_PREFIX", &defaults.admin_prefix),
            user_prefix: text("USER_PREFIX", &defaults.user_prefix),
            ranking: flag_or(&lookup, "RANKING", defaults.ranking)?,
            ranking_authentication: flag_or(
                &lookup,
                "RANKING_AUTHENTICATION",
                defaults.ranking_authentication,
            )?,
            voting: flag_or(&lookup, "VOTING", defaults.voting)?,
            vote,
            kick_block: minutes_or(&lookup, "KICK_BLOCK_MINUTES", defaults.kick_block)?,
            command_rate_limit: parsed_or(
                &lookup,
                "COMMAND_RATE_LIMIT",
                defaults.command_rate_limit,
            )?,
        };

        let lobby_port = match lookup("LOBBY_PORT") {
            Some(port) => Some(port.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "LOBBY_PORT",
                value: port,
            })?),
            None => None,
        };

        let global_settings = match lookup("GLOBAL_SETTINGS") {
            Some(raw) => parse_global_settings(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            log_level: text("LOG_LEVEL", "info"),
            lobby_port,
            preset_dir: PathBuf::from(text("PRESET_DIR", "scripts/presets")),
            level_dir: PathBuf::from(text("LEVEL_DIR", "levels")),
            mod_dir: PathBuf::from(text("MOD_DIR", ".")),
            ranking_file: PathBuf::from(text("RANKING_FILE", "pwn0meter.txt")),
            auth_file: PathBuf::from(text("AUTH_FILE", "pwn0meter_auth.txt")),
            global_settings,
            policy,
        })
    }
}

fn parsed_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => parse_secs(&value)
            .filter(|d| *d <= MAX_DURATION)
            .ok_or(ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn minutes_or<F>(lookup: &F, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|minutes| minutes.checked_mul(60))
            .map(Duration::from_secs)
            .filter(|d| *d <= MAX_DURATION)
            .ok_or(ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn flag_or<F>(lookup: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => parse_flag(&value).ok_or(ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Parse a boolean switch ("1", "true", "yes", "on" and their negatives)
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a comma separated list, dropping empty entries
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `Name=Value;Name=Value` engine variable assignments
pub fn parse_global_settings(value: &str) -> Result<Vec<(String, String)>, ConfigError> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidSetting(pair.to_string())),
        })
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("Invalid global setting {0:?}, expected Name=Value")]
    InvalidSetting(String),
}
