//! Recording engine link for tests

use std::collections::{HashMap, VecDeque};

use super::link::{EngineLink, LinkError};
use super::protocol::{Command, EngineId};

/// Engine stand-in: records every command and answers queries from tables
#[derive(Default)]
pub struct MockLink {
    pub sent: Vec<Command>,
    pub signals: VecDeque<Vec<String>>,
    pub pings: HashMap<EngineId, u32>,
    pub ips: HashMap<EngineId, String>,
    pub skins: HashMap<EngineId, (i64, String)>,
    pub vars: HashMap<String, String>,
    pub start_game_errors: Vec<String>,
}

impl MockLink {
    pub fn new() -> Self {
        let mut link = Self::default();
        link.vars
            .insert("GameOptions.GameInfo.GameType".to_string(), "0".to_string());
        link
    }

    /// Queue a signal for `next_signal`
    pub fn push_signal(&mut self, tokens: &[&str]) {
        self.signals
            .push_back(tokens.iter().map(|t| t.to_string()).collect());
    }

    /// Drain the recorded commands
    pub fn take_sent(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.sent)
    }

    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.sent.iter().filter(|c| predicate(c)).count()
    }

    pub fn chats(&self) -> Vec<String> {
        self.sent
            .iter()
            .filter_map(|c| match c {
                Command::ChatMsg(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn private_to(&self, id: EngineId) -> Vec<String> {
        self.sent
            .iter()
            .filter_map(|c| match c {
                Command::PrivateMsg { id: to, text } if *to == id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn kicks(&self) -> Vec<(EngineId, Option<String>)> {
        self.sent
            .iter()
            .filter_map(|c| match c {
                Command::KickPlayer { id, reason } => Some((*id, reason.clone())),
                _ => None,
            })
            .collect()
    }
}

impl EngineLink for MockLink {
    async fn send(&mut self, command: &Command) -> Result<Vec<String>, LinkError> {
        self.sent.push(command.clone());

        let answer = match command {
            Command::NextSignal => return self.signals.pop_front().ok_or(LinkError::Closed),
            Command::GetPlayerPing(id) => self
                .pings
                .get(id)
                .map(|p| vec![p.to_string()])
                .unwrap_or_default(),
            Command::GetPlayerIp(id) => self
                .ips
                .get(id)
                .map(|ip| vec![format!("{}:23400", ip)])
                .unwrap_or_default(),
            Command::GetPlayerSkin(id) => {
                let (colour, name) = self
                    .skins
                    .get(id)
                    .cloned()
                    .unwrap_or((0, "default.png".to_string()));
                vec![colour.to_string(), name]
            }
            Command::GetVar(name) => self.vars.get(name).cloned().into_iter().collect(),
            Command::SetVar { name, value } => {
                self.vars.insert(name.clone(), value.clone());
                Vec::new()
            }
            Command::StartGame => self.start_game_errors.clone(),
            _ => Vec::new(),
        };
        Ok(answer)
    }
}
