//! Signal dispatch and the run loop

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{SessionController, SessionError, SessionState};
use crate::engine::protocol::{parse_ip, parse_skin};
use crate::engine::{Command, EngineId, EngineLink, Signal};
use crate::store::IdentityCheck;
use crate::util::time::minutes_until;

impl<L: EngineLink> SessionController<L> {
    /// Open the lobby, push global settings and select the first preset
    pub async fn start(
        &mut self,
        lobby_port: Option<u16>,
        global_settings: &[(String, String)],
    ) -> Result<(), SessionError> {
        self.send(Command::StartLobby { port: lobby_port }).await?;
        for (name, value) in global_settings {
            self.send(Command::SetVar {
                name: name.clone(),
                value: value.clone(),
            })
            .await?;
        }
        self.activate_next_preset().await?;
        info!(port = ?lobby_port, "Lobby requested");
        Ok(())
    }

    /// Process signals until the engine quits or the link fails
    pub async fn run(&mut self) -> Result<(), SessionError> {
        while self.state != SessionState::Quit {
            let tokens = self.link.next_signal().await?;
            if tokens.is_empty() {
                continue;
            }

            let signal = match Signal::decode(&tokens) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!(error = %e, signal = ?tokens, "Malformed signal, skipping");
                    continue;
                }
            };

            match self.handle_signal(signal).await {
                Ok(()) => {}
                Err(e @ SessionError::Link(_)) => return Err(e),
                Err(e) => error!(error = %e, "Signal handling failed"),
            }
        }
        info!("Engine quit");
        Ok(())
    }

    pub async fn handle_signal(&mut self, signal: Signal) -> Result<(), SessionError> {
        self.previous_state = self.state;
        debug!(signal = ?signal, state = ?self.state, "Signal");

        match signal {
            Signal::NewPlayer { id, name } => self.on_new_player(id, &name).await?,
            Signal::PlayerLeft { id } => self.on_player_left(id).await?,
            Signal::PrivateMessage => {}
            Signal::ChatMessage { id, text } => self.on_chat(id, &text).await?,
            Signal::PlayerDied { deader, killer } => self.on_player_died(deader, killer).await?,
            Signal::PlayerSpawned { id } => {
                if !self.roster.mark_alive(id) {
                    return Err(SessionError::UnknownPlayer(id));
                }
            }
            Signal::PlayerAuthorized { id } => self.on_authorized(id).await?,
            Signal::Quit => self.state = SessionState::Quit,
            Signal::BackToLobby | Signal::LobbyStarted => {
                if self.policy.ranking {
                    if let Err(e) = self.ranking.refresh().await {
                        error!(error = %e, "Failed to refresh ranking");
                    }
                }
                self.state = SessionState::Lobby;
                self.game_start_sent = false;
                self.tick().await?;
            }
            Signal::ErrorStartGame => {
                error!("Engine failed to start the game");
                self.state = SessionState::Lobby;
                self.game_start_sent = false;
            }
            Signal::WeaponSelections => {
                self.state = SessionState::WeaponSelect;
                self.tick().await?;
            }
            Signal::GameStarted => {
                self.state = SessionState::Playing;
                self.game_start_sent = false;
                self.tick().await?;
            }
            Signal::GameLoopStart | Signal::GameLoopEnd => {}
            Signal::Timer => self.tick().await?,
            Signal::Unrecognized(header) => warn!(header = %header, "Unrecognized signal"),
        }
        Ok(())
    }

    async fn on_new_player(&mut self, id: EngineId, raw_name: &str) -> Result<(), SessionError> {
        let joined = self.roster.join(id, raw_name);
        let key = joined.key();

        let team = self.roster.balanced_team();
        self.roster.set_team(key, team);
        self.send(Command::SetPlayerTeam { id, team }).await?;

        let name = self
            .roster
            .get(key)
            .map(|p| p.name.clone())
            .ok_or(SessionError::UnknownPlayer(id))?;
        info!(id, name = %name, joined = ?joined, "Player joined");

        let mut kicked = false;
        if self.policy.ranking_authentication {
            let lines = self.send(Command::GetPlayerSkin(id)).await?;
            let skin = parse_skin(&lines)?;
            match self.identities.check(&name, &skin).await {
                Ok(IdentityCheck::Mismatch) => {
                    info!(id, name = %name, "Name registered to another skin, kicking");
                    let reason = format!("Player with name {} already registered", name);
                    self.kick(id, Some(reason)).await?;
                    kicked = true;
                }
                Ok(check) => debug!(id, check = ?check, "Identity checked"),
                Err(e) => error!(error = %e, "Failed to record identity"),
            }
        }

        let now = Instant::now();
        self.kick_blocks.retain(|_, until| *until > now);
        if !self.kick_blocks.is_empty() {
            let ip = parse_ip(&self.send(Command::GetPlayerIp(id)).await?);
            match self.kick_blocks.get(&ip) {
                Some(&until) if !kicked => {
                    info!(id, ip = %ip, "Recently kicked player rejoined, kicking");
                    let reason = format!("You can join in {} minutes", minutes_until(until, now));
                    self.kick(id, Some(reason)).await?;
                }
                Some(_) => debug!(id, ip = %ip, "Blocked player already kicked"),
                None => {}
            }
        }

        self.reevaluate_vote().await
    }

    async fn on_player_left(&mut self, id: EngineId) -> Result<(), SessionError> {
        let Some(player) = self.roster.remove(id) else {
            warn!(id, "Unknown player left");
            return Ok(());
        };
        if player.is_admin {
            info!(target: "admin", id, name = %player.name, "Removed from admins");
        }
        info!(id, name = %player.name, "Player left");
        self.command_limiter.forget(player.key);

        self.reevaluate_vote().await?;

        // Nobody left to unpause by hand
        if !self.roster.has_admins() {
            self.script_paused = false;
        }
        Ok(())
    }

    async fn on_player_died(&mut self, deader: EngineId, killer: EngineId) -> Result<(), SessionError> {
        if !self.roster.mark_dead(deader) {
            return Err(SessionError::UnknownPlayer(deader));
        }
        if !self.policy.ranking {
            return Ok(());
        }

        let name_of = |id| {
            self.roster
                .by_id(id)
                .map(|p| p.name.clone())
                .ok_or(SessionError::UnknownPlayer(id))
        };
        let deader_name = name_of(deader)?;
        let killer_name = name_of(killer)?;
        self.ranking.record_death(&deader_name, &killer_name).await?;
        Ok(())
    }

    async fn on_authorized(&mut self, id: EngineId) -> Result<(), SessionError> {
        let key = self.roster.key_of(id).ok_or(SessionError::UnknownPlayer(id))?;
        if !self.roster.grant_admin(key) {
            return Ok(());
        }

        let name = self.roster.get(key).map(|p| p.name.clone()).unwrap_or_default();
        info!(target: "admin", id, name = %name, "Added to admins");
        self.send(Command::AuthorizePlayer { id }).await?;
        let hint = format!(
            "{} authenticated for admin! Type {}help for command info",
            name, self.policy.admin_prefix
        );
        self.private(id, hint).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{controller, in_lobby, join, say};
    use super::*;
    use crate::config::SessionPolicy;
    use crate::engine::mock::MockLink;
    use crate::engine::LinkError;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_start_opens_lobby_then_pushes_settings_then_preset() {
        let mut controller = controller(SessionPolicy::default());
        let settings = vec![("GameOptions.GameInfo.Lives".to_string(), "10".to_string())];
        controller.start(Some(23400), &settings).await.unwrap();

        let sent = controller.link_mut().take_sent();
        assert_eq!(sent[0], Command::StartLobby { port: Some(23400) });
        assert_eq!(
            sent[1],
            Command::SetVar {
                name: "GameOptions.GameInfo.Lives".to_string(),
                value: "10".to_string()
            }
        );
        assert_eq!(sent[2], Command::ConsoleMsg("Preset Classic".to_string()));
        assert!(sent.contains(&Command::SetVar {
            name: "GameOptions.GameInfo.ModName".to_string(),
            value: "Classic".to_string()
        }));
        assert_eq!(controller.state(), SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_balances_teams() {
        let mut controller = controller(SessionPolicy::default());
        for id in 0..3 {
            join(&mut controller, id).await;
        }
        let teams: Vec<_> = controller
            .link_mut()
            .sent
            .iter()
            .filter_map(|c| match c {
                Command::SetPlayerTeam { id, team } => Some((*id, *team)),
                _ => None,
            })
            .collect();
        assert_eq!(teams, vec![(0, 1), (1, 0), (2, 1)]);

        // A repeated newworm renames and rebalances
        controller.link_mut().take_sent();
        controller
            .handle_signal(Signal::NewPlayer {
                id: 1,
                name: "Renamed".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            controller.link_mut().take_sent()[0],
            Command::SetPlayerTeam { id: 1, team: 0 }
        );
        assert_eq!(controller.roster().by_id(1).unwrap().name, "Renamed");
        assert_eq!(controller.roster().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rename_of_lone_player_moves_team() {
        let mut controller = controller(SessionPolicy::default());
        join(&mut controller, 0).await;
        controller
            .handle_signal(Signal::NewPlayer {
                id: 0,
                name: "worm0 again".to_string(),
            })
            .await
            .unwrap();

        let teams: Vec<_> = controller
            .link_mut()
            .sent
            .iter()
            .filter_map(|c| match c {
                Command::SetPlayerTeam { id, team } => Some((*id, *team)),
                _ => None,
            })
            .collect();
        assert_eq!(teams, vec![(0, 1), (0, 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_mismatch_is_kicked() {
        let policy = SessionPolicy {
            ranking_authentication: true,
            ..SessionPolicy::default()
        };
        let mut controller = controller(policy);
        controller.link_mut().skins.insert(0, (255, "ninja.png".to_string()));
        controller.link_mut().skins.insert(1, (7, "default.png".to_string()));

        controller
            .handle_signal(Signal::NewPlayer {
                id: 0,
                name: "Mike".to_string(),
            })
            .await
            .unwrap();
        controller.handle_signal(Signal::PlayerLeft { id: 0 }).await.unwrap();
        controller
            .handle_signal(Signal::NewPlayer {
                id: 1,
                name: "Mike".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(
            controller.link_mut().kicks(),
            vec![(1, Some("Player with name Mike already registered".to_string()))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_impostor_still_settles_vote_and_is_kicked_once() {
        let policy = SessionPolicy {
            ranking_authentication: true,
            ..SessionPolicy::default()
        };
        let mut controller = in_lobby(policy, 3).await;
        controller.link_mut().skins.insert(7, (9, "ninja.png".to_string()));
        controller.link_mut().ips.insert(2, "10.0.0.3".to_string());
        controller.link_mut().ips.insert(7, "10.0.0.3".to_string());
        controller.handle_signal(Signal::PlayerAuthorized { id: 0 }).await.unwrap();
        say(&mut controller, 0, "//kick 2").await;
        controller.handle_signal(Signal::PlayerLeft { id: 2 }).await.unwrap();

        say(&mut controller, 0, "!lt 80").await;
        controller.link_mut().take_sent();

        // Impostor of worm1 from the blocked address
        controller
            .handle_signal(Signal::NewPlayer {
                id: 7,
                name: "worm1".to_string(),
            })
            .await
            .unwrap();

        let sent = controller.link_mut().take_sent();
        assert!(sent.contains(&Command::GetPlayerIp(7)));
        let kicks: Vec<_> = sent
            .iter()
            .filter(|c| matches!(c, Command::KickPlayer { .. }))
            .collect();
        assert_eq!(
            kicks,
            vec![&Command::KickPlayer {
                id: 7,
                reason: Some("Player with name worm1 already registered".to_string())
            }]
        );
        // The vote tally is re-announced for the grown roster
        assert!(sent.iter().any(|c| matches!(
            c,
            Command::ChatMsg(text) if text.starts_with("Vote: Loading time 80")
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kicked_player_is_blocked_on_rejoin() {
        let mut controller = in_lobby(SessionPolicy::default(), 2).await;
        controller.link_mut().ips.insert(1, "10.0.0.9".to_string());
        controller.handle_signal(Signal::PlayerAuthorized { id: 0 }).await.unwrap();

        say(&mut controller, 0, "//kick 1").await;
        controller.handle_signal(Signal::PlayerLeft { id: 1 }).await.unwrap();
        controller.link_mut().take_sent();

        tokio::time::advance(Duration::from_secs(90)).await;
        controller.link_mut().ips.insert(5, "10.0.0.9".to_string());
        join(&mut controller, 5).await;
        assert_eq!(
            controller.link_mut().kicks(),
            vec![(5, Some("You can join in 4 minutes".to_string()))]
        );

        // Block over: welcome back
        controller.handle_signal(Signal::PlayerLeft { id: 5 }).await.unwrap();
        controller.link_mut().take_sent();
        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        join(&mut controller, 5).await;
        assert!(controller.link_mut().kicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_admin_leaving_unpauses() {
        let mut controller = in_lobby(SessionPolicy::default(), 2).await;
        controller.handle_signal(Signal::PlayerAuthorized { id: 0 }).await.unwrap();
        assert_eq!(
            controller.link_mut().private_to(0),
            vec!["worm0 authenticated for admin! Type //help for command info".to_string()]
        );

        say(&mut controller, 0, "//pause").await;
        assert!(controller.is_paused());

        controller.handle_signal(Signal::PlayerLeft { id: 1 }).await.unwrap();
        assert!(controller.is_paused());
        controller.handle_signal(Signal::PlayerLeft { id: 0 }).await.unwrap();
        assert!(!controller.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deaths_feed_ranking() {
        let mut controller = in_lobby(SessionPolicy::default(), 2).await;
        controller.handle_signal(Signal::PlayerSpawned { id: 0 }).await.unwrap();
        controller
            .handle_signal(Signal::PlayerDied { deader: 0, killer: 1 })
            .await
            .unwrap();

        let victim = controller.roster().by_id(0).unwrap();
        assert!(!victim.alive);
        assert_eq!(controller.ranking.rank_of("worm1").unwrap().1.kills, 1);
        assert_eq!(controller.ranking.rank_of("worm0").unwrap().1.deaths, 1);

        let err = controller
            .handle_signal(Signal::PlayerDied { deader: 9, killer: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownPlayer(9)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_quit_and_skips_bad_signals() {
        let mut link = MockLink::new();
        link.push_signal(&["newworm", "x", "Bad"]);
        link.push_signal(&["newworm", "0", "Good"]);
        link.push_signal(&["wormspawned", "7"]);
        link.push_signal(&["quit"]);
        link.push_signal(&["timer"]);
        let mut controller =
            SessionController::new(link, SessionPolicy::default(), super::super::testing::services());

        controller.run().await.unwrap();
        assert_eq!(controller.state(), SessionState::Quit);
        assert_eq!(controller.roster().len(), 1);
        // The signal after quit is never requested
        assert_eq!(controller.link_mut().signals.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fails_when_link_closes() {
        let mut controller = controller(SessionPolicy::default());
        let err = controller.run().await.unwrap_err();
        assert!(matches!(err, SessionError::Link(LinkError::Closed)));
    }
}
