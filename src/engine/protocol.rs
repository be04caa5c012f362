//! Engine protocol definitions
//! Signals are decoded once here; commands are encoded to their wire line here.

use std::fmt;

/// Engine-assigned player id; reused after a player leaves
pub type EngineId = u32;

/// Signals delivered by the engine in answer to `nextsignal`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A player connected (or an existing id was renamed)
    NewPlayer { id: EngineId, name: String },
    /// A player disconnected
    PlayerLeft { id: EngineId },
    /// Private message between players, not acted upon
    PrivateMessage,
    /// Public chat line
    ChatMessage { id: EngineId, text: String },
    /// A player died; `killer == deader` for suicides
    PlayerDied { deader: EngineId, killer: EngineId },
    /// A player (re)spawned
    PlayerSpawned { id: EngineId },
    /// A player logged in as admin through the engine
    PlayerAuthorized { id: EngineId },
    /// The engine is shutting down
    Quit,
    /// A game ended and the lobby is back
    BackToLobby,
    /// The lobby came up for the first time
    LobbyStarted,
    /// `startgame` failed on the engine side
    ErrorStartGame,
    /// Weapon selection screen opened
    WeaponSelections,
    /// The match is running
    GameStarted,
    /// Game loop bookkeeping, ignored
    GameLoopStart,
    /// Game loop bookkeeping, ignored
    GameLoopEnd,
    /// Sent by the engine once per second
    Timer,
    /// Any header this controller does not know
    Unrecognized(String),
}

impl Signal {
    /// Decode a signal from its response tokens
    pub fn decode(tokens: &[String]) -> Result<Self, ProtocolError> {
        let header = tokens.first().ok_or(ProtocolError::EmptySignal)?;
        let field = |index: usize, name: &'static str| -> Result<&str, ProtocolError> {
            tokens
                .get(index)
                .map(String::as_str)
                .ok_or(ProtocolError::MissingField {
                    signal: header.clone(),
                    field: name,
                })
        };
        let id = |index: usize, name: &'static str| -> Result<EngineId, ProtocolError> {
            let raw = field(index, name)?;
            raw.trim().parse().map_err(|_| ProtocolError::InvalidNumber {
                field: name,
                value: raw.to_string(),
            })
        };

        Ok(match header.as_str() {
            "newworm" => Signal::NewPlayer {
                id: id(1, "id")?,
                name: field(2, "name")?.to_string(),
            },
            "wormleft" => Signal::PlayerLeft { id: id(1, "id")? },
            "privatemessage" => Signal::PrivateMessage,
            "chatmessage" => Signal::ChatMessage {
                id: id(1, "id")?,
                text: field(2, "text")?.to_string(),
            },
            "wormdied" => Signal::PlayerDied {
                deader: id(1, "deader")?,
                killer: id(2, "killer")?,
            },
            "wormspawned" => Signal::PlayerSpawned { id: id(1, "id")? },
            "wormauthorized" => Signal::PlayerAuthorized { id: id(1, "id")? },
            "quit" => Signal::Quit,
            "backtolobby" => Signal::BackToLobby,
            "lobbystarted" => Signal::LobbyStarted,
            "errorstartgame" => Signal::ErrorStartGame,
            "weaponselections" => Signal::WeaponSelections,
            "gamestarted" => Signal::GameStarted,
            "gameloopstart" => Signal::GameLoopStart,
            "gameloopend" => Signal::GameLoopEnd,
            "timer" => Signal::Timer,
            other => Signal::Unrecognized(other.to_string()),
        })
    }
}

/// Commands sent to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetVar { name: String, value: String },
    StartLobby { port: Option<u16> },
    StartGame,
    GotoLobby,
    KickPlayer { id: EngineId, reason: Option<String> },
    BanPlayer { id: EngineId, reason: Option<String> },
    MutePlayer { id: EngineId },
    SetPlayerTeam { id: EngineId, team: usize },
    AuthorizePlayer { id: EngineId },
    /// Line on the engine console
    ConsoleMsg(String),
    /// Public chat line
    ChatMsg(String),
    PrivateMsg { id: EngineId, text: String },
    GetPlayerIp(EngineId),
    GetPlayerPing(EngineId),
    GetPlayerSkin(EngineId),
    GetVar(String),
    NextSignal,
}

impl Command {
    /// Encode to the single line written on the wire
    pub fn encode(&self) -> String {
        match self {
            Command::SetVar { name, value } => format!("setvar {} {}", name, quote(value)),
            Command::StartLobby { port: Some(port) } => format!("startlobby {}", port),
            Command::StartLobby { port: None } => "startlobby".to_string(),
            Command::StartGame => "startgame".to_string(),
            Command::GotoLobby => "gotolobby".to_string(),
            Command::KickPlayer { id, reason } => with_reason("kickworm", *id, reason),
            Command::BanPlayer { id, reason } => with_reason("banworm", *id, reason),
            Command::MutePlayer { id } => format!("muteworm {}", id),
            Command::SetPlayerTeam { id, team } => format!("setwormteam {} {}", id, team),
            Command::AuthorizePlayer { id } => format!("authorizeworm {}", id),
            Command::ConsoleMsg(text) => format!("msg {}", quote(text)),
            Command::ChatMsg(text) => format!("chatmsg {}", quote(text)),
            Command::PrivateMsg { id, text } => format!("privatemsg {} {}", id, quote(text)),
            Command::GetPlayerIp(id) => format!("getwormip {}", id),
            Command::GetPlayerPing(id) => format!("getwormping {}", id),
            Command::GetPlayerSkin(id) => format!("getwormskin {}", id),
            Command::GetVar(name) => format!("getvar {}", name),
            Command::NextSignal => "nextsignal".to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "'"))
}

fn with_reason(verb: &str, id: EngineId, reason: &Option<String>) -> String {
    match reason {
        Some(reason) if !reason.is_empty() => format!("{} {} {}", verb, id, reason),
        _ => format!("{} {}", verb, id),
    }
}

/// Player skin as reported by `getwormskin`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skin {
    pub colour: i64,
    pub name: String,
}

impl fmt::Display for Skin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.colour, self.name)
    }
}

/// Parse a `getwormping` response; no answer means no measurement (0)
pub fn parse_ping(lines: &[String]) -> Result<u32, ProtocolError> {
    match lines.first() {
        Some(raw) => raw.trim().parse().map_err(|_| ProtocolError::InvalidNumber {
            field: "ping",
            value: raw.clone(),
        }),
        None => Ok(0),
    }
}

/// Parse a `getwormip` response down to the bare address
pub fn parse_ip(lines: &[String]) -> String {
    lines
        .first()
        .map(|raw| raw.split(':').next().unwrap_or_default().trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "0.0.0.0".to_string())
}

/// Parse a `getwormskin` response: colour line, then skin file name
pub fn parse_skin(lines: &[String]) -> Result<Skin, ProtocolError> {
    let (colour, name) = match lines {
        [colour, name, ..] => (colour, name),
        _ => return Err(ProtocolError::ShortResponse("getwormskin")),
    };
    let colour = colour.trim().parse().map_err(|_| ProtocolError::InvalidNumber {
        field: "skin colour",
        value: colour.clone(),
    })?;
    Ok(Skin {
        colour,
        name: name.trim().to_lowercase(),
    })
}

/// Protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Empty signal")]
    EmptySignal,

    #[error("Signal {signal} is missing its {field}")]
    MissingField { signal: String, field: &'static str },

    #[error("Invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Short response to {0}")]
    ShortResponse(&'static str),
}
