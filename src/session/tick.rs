//! Periodic control tick: lobby countdown, weapon screen guard, ping limits

use tokio::time::Instant;
use tracing::{error, info, warn};

use super::{SessionController, SessionError, SessionState};
use crate::engine::protocol::parse_ping;
use crate::engine::{Command, EngineLink};

/// Engine variable holding the game mode; 0 is free-for-all, 1 teams
pub const GAME_TYPE_VAR: &str = "GameOptions.GameInfo.GameType";

const GAME_TYPE_FREE_FOR_ALL: i64 = 0;
const GAME_TYPE_TEAMS: i64 = 1;

impl<L: EngineLink> SessionController<L> {
    /// Run the policy for the current state; a no-op while paused
    pub async fn tick(&mut self) -> Result<(), SessionError> {
        if self.script_paused {
            return Ok(());
        }
        match self.state {
            SessionState::Lobby => self.lobby_tick().await,
            SessionState::WeaponSelect => self.weapon_select_tick().await,
            SessionState::Playing => self.enforce_ping_limit().await,
            SessionState::Ready | SessionState::Quit => Ok(()),
        }
    }

    async fn lobby_tick(&mut self) -> Result<(), SessionError> {
        let now = Instant::now();

        if self.previous_state != SessionState::Lobby || self.timers.change_preset <= now {
            self.timers.change_preset = now + self.policy.preset_timeout;
            self.activate_next_preset().await?;
            self.enough_players_seen = false;
            self.timers.low_player_warning = now + self.policy.low_player_warning_interval;
            self.timers.wait_after_game = if self.previous_state == SessionState::Playing {
                now + self.policy.wait_after_game
            } else {
                now
            };
        }

        if self.timers.wait_after_game > now {
            return Ok(());
        }

        let players = self.roster.len();

        if !self.enough_players_seen && self.timers.low_player_warning <= now {
            self.timers.low_player_warning = now + self.policy.low_player_warning_interval;
            self.chat(self.policy.too_few_players_message.clone()).await?;
        }

        if !self.enough_players_seen && players >= self.policy.min_players {
            self.enough_players_seen = true;
            self.timers.wait_before_game = now + self.policy.wait_before_game;
            info!(players, "Enough players, game countdown started");
            self.chat(self.policy.wait_before_game_message.clone()).await?;
        }

        if self.enough_players_seen && players < self.policy.min_players {
            self.enough_players_seen = false;
            info!(players, "Players left, game countdown cancelled");
            self.chat(self.policy.too_few_players_message.clone()).await?;
        }

        if self.enough_players_seen && !self.game_start_sent && self.timers.wait_before_game <= now {
            self.start_game().await?;
        }
        Ok(())
    }

    async fn start_game(&mut self) -> Result<(), SessionError> {
        let players = self.roster.len();
        let teams = players >= self.policy.min_players_teams;

        if self.current_game_type().await? == GAME_TYPE_FREE_FOR_ALL {
            if teams {
                self.set_game_type(GAME_TYPE_TEAMS).await?;
                if !self.policy.allow_team_change {
                    self.assign_teams_round_robin().await?;
                }
            } else {
                self.set_game_type(GAME_TYPE_FREE_FOR_ALL).await?;
            }
        }

        for line in self.send(Command::StartGame).await? {
            error!(error = %line, "Engine refused to start the game");
        }
        self.game_start_sent = true;
        info!(players, teams, "Game start sent");

        if self.policy.allow_team_change && teams {
            self.chat(self.policy.team_change_message.clone()).await?;
        }
        Ok(())
    }

    /// Current game type; unknown answers count as free-for-all
    async fn current_game_type(&mut self) -> Result<i64, SessionError> {
        let lines = self.send(Command::GetVar(GAME_TYPE_VAR.to_string())).await?;
        let raw = lines.first().map(|l| l.trim()).unwrap_or_default();
        Ok(raw.parse().unwrap_or_else(|_| {
            warn!(value = %raw, "Unreadable game type, assuming free-for-all");
            GAME_TYPE_FREE_FOR_ALL
        }))
    }

    async fn set_game_type(&mut self, game_type: i64) -> Result<(), SessionError> {
        self.send(Command::SetVar {
            name: GAME_TYPE_VAR.to_string(),
            value: game_type.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn assign_teams_round_robin(&mut self) -> Result<(), SessionError> {
        let max_teams = self.roster.max_teams();
        for (index, key) in self.roster.keys().into_iter().enumerate() {
            let team = index % max_teams;
            self.roster.set_team(key, team);
            self.send(Command::SetPlayerTeam { id: key.id, team }).await?;
        }
        Ok(())
    }

    async fn weapon_select_tick(&mut self) -> Result<(), SessionError> {
        if self.roster.len() < self.policy.min_players {
            info!(players = self.roster.len(), "Too few players for weapon selection, back to lobby");
            self.send(Command::GotoLobby).await?;
            self.game_start_sent = false;
        }
        Ok(())
    }

    /// Sample living players' pings and kick anyone over the limit
    async fn enforce_ping_limit(&mut self) -> Result<(), SessionError> {
        let max_ping = self.policy.max_ping;
        for key in self.roster.alive_keys() {
            let lines = self.send(Command::GetPlayerPing(key.id)).await?;
            let ping = match parse_ping(&lines) {
                Ok(ping) => ping,
                Err(e) => {
                    warn!(id = key.id, error = %e, "Bad ping answer");
                    continue;
                }
            };

            let Some(mean) = self.roster.record_ping(key, ping) else {
                continue;
            };
            if mean > f64::from(max_ping) {
                info!(id = key.id, mean, max_ping, "Ping over limit, kicking");
                // Fresh window, so the kick is not repeated every tick
                self.roster.clear_pings(key);
                let reason = format!("Your ping is {:.0} allowed is {}", mean, max_ping);
                self.kick(key.id, Some(reason)).await?;
            }
        }
        Ok(())
    }
}
