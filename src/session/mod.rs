//! Session state machine
//!
//! `SessionController` consumes engine signals, keeps the roster, voting and
//! rotation state, and drives the engine through its link. It owns no timer:
//! the engine's `timer` signal drives the periodic control tick.

mod commands;
mod signals;
mod tick;

use std::collections::HashMap;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::commands::CommandError;
use crate::config::SessionPolicy;
use crate::engine::{Command, EngineId, EngineLink, LinkError, ProtocolError};
use crate::game::{Roster, VotingEngine};
use crate::rotation::PresetScheduler;
use crate::store::{Catalog, CatalogError, IdentityRegistry, RankingError, RankingStore};
use crate::util::rate_limit::CommandRateLimiter;

/// Engine session state as seen by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Started, waiting for the lobby to come up
    Ready,
    Quit,
    Lobby,
    WeaponSelect,
    Playing,
}

/// Lobby deadlines
#[derive(Debug, Clone)]
struct LobbyTimers {
    change_preset: Instant,
    wait_before_game: Instant,
    wait_after_game: Instant,
    low_player_warning: Instant,
}

impl LobbyTimers {
    fn new(policy: &SessionPolicy, now: Instant) -> Self {
        Self {
            change_preset: now + policy.preset_timeout,
            wait_before_game: now + policy.wait_before_game,
            wait_after_game: now,
            low_player_warning: now + policy.low_player_warning_interval,
        }
    }
}

/// File-backed collaborators of the controller
pub struct Services {
    pub catalog: Catalog,
    pub ranking: RankingStore,
    pub identities: IdentityRegistry,
}

pub struct SessionController<L> {
    link: L,
    policy: SessionPolicy,

    roster: Roster,
    votes: VotingEngine,
    scheduler: PresetScheduler,

    catalog: Catalog,
    ranking: RankingStore,
    identities: IdentityRegistry,

    command_limiter: CommandRateLimiter,
    /// Player IP to the instant its rejoin block ends
    kick_blocks: HashMap<String, Instant>,

    state: SessionState,
    previous_state: SessionState,
    timers: LobbyTimers,
    enough_players_seen: bool,
    game_start_sent: bool,
    script_paused: bool,
}

impl<L: EngineLink> SessionController<L> {
    pub fn new(link: L, policy: SessionPolicy, services: Services) -> Self {
        let now = Instant::now();
        Self {
            link,
            roster: Roster::new(policy.max_teams),
            votes: VotingEngine::new(policy.vote.clone()),
            scheduler: PresetScheduler::new(policy.presets.clone()),
            catalog: services.catalog,
            ranking: services.ranking,
            identities: services.identities,
            command_limiter: CommandRateLimiter::new(policy.command_rate_limit),
            kick_blocks: HashMap::new(),
            state: SessionState::Ready,
            previous_state: SessionState::Ready,
            timers: LobbyTimers::new(&policy, now),
            enough_players_seen: false,
            game_start_sent: false,
            script_paused: false,
            policy,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    #[cfg(test)]
    pub fn is_paused(&self) -> bool {
        self.script_paused
    }

    #[cfg(test)]
    pub(crate) fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    async fn send(&mut self, command: Command) -> Result<Vec<String>, SessionError> {
        Ok(self.link.send(&command).await?)
    }

    async fn chat(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Command::ChatMsg(text.into())).await?;
        Ok(())
    }

    async fn private(&mut self, id: EngineId, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Command::PrivateMsg {
            id,
            text: text.into(),
        })
        .await?;
        Ok(())
    }

    async fn kick(&mut self, id: EngineId, reason: Option<String>) -> Result<(), SessionError> {
        self.send(Command::KickPlayer { id, reason }).await?;
        Ok(())
    }

    /// Activate the next preset and push it to the engine
    async fn activate_next_preset(&mut self) -> Result<(), SessionError> {
        let Some(activation) = self.scheduler.advance(&self.catalog) else {
            warn!("No presets to activate");
            return Ok(());
        };
        info!(preset = %activation.preset, "Preset activated");
        for command in activation.commands {
            self.send(command).await?;
        }
        if activation.file_missing {
            self.catalog.rescan().await?;
        }
        Ok(())
    }
}

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Ranking(#[from] RankingError),

    #[error("No player with id {0}")]
    UnknownPlayer(EngineId),
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::engine::mock::MockLink;
    use crate::engine::Signal;
    use crate::store::catalog::PresetFile;

    pub fn services() -> Services {
        Services {
            catalog: Catalog::from_entries(
                vec![
                    (
                        "Classic".to_string(),
                        PresetFile {
                            mod_name: Some("Classic".to_string()),
                            ..PresetFile::default()
                        },
                    ),
                    ("Rifles".to_string(), PresetFile::default()),
                ],
                None,
                vec!["Castle.lxl".to_string(), "Dirt.lxl".to_string()],
                vec!["Classic".to_string(), "Rifles".to_string()],
            ),
            ranking: RankingStore::in_memory(),
            identities: IdentityRegistry::in_memory(),
        }
    }

    pub fn controller(policy: SessionPolicy) -> SessionController<MockLink> {
        SessionController::new(MockLink::new(), policy, services())
    }

    /// Controller already sitting in the lobby with `players` joined
    pub async fn in_lobby(policy: SessionPolicy, players: u32) -> SessionController<MockLink> {
        let mut controller = controller(policy);
        controller.handle_signal(Signal::LobbyStarted).await.unwrap();
        for id in 0..players {
            join(&mut controller, id).await;
        }
        controller.link_mut().take_sent();
        controller
    }

    pub async fn join(controller: &mut SessionController<MockLink>, id: EngineId) {
        controller
            .handle_signal(Signal::NewPlayer {
                id,
                name: format!("worm{}", id),
            })
            .await
            .unwrap();
    }

    pub async fn say(controller: &mut SessionController<MockLink>, id: EngineId, text: &str) {
        controller
            .handle_signal(Signal::ChatMessage {
                id,
                text: text.to_string(),
            })
            .await
            .unwrap();
    }
}
