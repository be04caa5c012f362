//! Chat command execution and vote handling

use tokio::time::Instant;
use tracing::{info, warn};

use super::{SessionController, SessionError, SessionState};
use crate::commands::{admin, AdminCommand, CommandError, UserCommand, UserHelp};
use crate::engine::protocol::parse_ip;
use crate::engine::{Command, EngineId, EngineLink};
use crate::game::{PlayerKey, VoteAction, VoteChoice, VoteOutcome};
use crate::rotation::PresetOverride;

/// Entries shown by the top rank command
const TOP_RANK_COUNT: usize = 5;

impl<L: EngineLink> SessionController<L> {
    pub(super) async fn on_chat(&mut self, id: EngineId, text: &str) -> Result<(), SessionError> {
        let player = self.roster.by_id(id).ok_or(SessionError::UnknownPlayer(id))?;
        let (key, is_admin, name) = (player.key, player.is_admin, player.name.clone());
        info!(id, name = %name, text = %text, "Chat message");

        let admin = if is_admin {
            AdminCommand::parse(text, &self.policy.admin_prefix)
        } else {
            None
        };
        let user = match admin {
            Some(_) => None,
            None => UserCommand::parse(text, &self.policy.user_prefix),
        };
        if admin.is_none() && user.is_none() {
            return Ok(());
        }

        if !self.command_limiter.check(key) {
            warn!(id, name = %name, "Chat command rate limited");
            return Ok(());
        }

        let (result, invalid) = match (admin, user) {
            (Some(parsed), _) => {
                info!(target: "admin", id, name = %name, command = %text, "Admin command");
                let result = match parsed {
                    Ok(command) => self.run_admin_command(key, command).await,
                    Err(e) => Err(e.into()),
                };
                (result, "Invalid admin command")
            }
            (None, Some(parsed)) => {
                info!(target: "usercmd", id, name = %name, command = %text, "User command");
                let result = match parsed {
                    Ok(command) => self.run_user_command(key, command).await,
                    Err(e) => Err(e.into()),
                };
                (result, "Invalid user command")
            }
            (None, None) => return Ok(()),
        };

        match result {
            Err(SessionError::Command(e)) => {
                warn!(id, error = %e, "Command rejected");
                let reply = match e {
                    CommandError::Unknown(_) => invalid.to_string(),
                    other => other.to_string(),
                };
                self.private(id, reply).await
            }
            other => other,
        }
    }

    async fn run_admin_command(
        &mut self,
        issuer: PlayerKey,
        command: AdminCommand,
    ) -> Result<(), SessionError> {
        match command {
            AdminCommand::Help => {
                for line in admin::help_lines(&self.policy.admin_prefix) {
                    self.private(issuer.id, line).await?;
                }
            }
            AdminCommand::Kick { id, reason } => {
                self.require_player(id)?;
                self.block_rejoin(id).await?;
                self.kick(id, reason).await?;
            }
            AdminCommand::Ban { id, reason } => {
                self.require_player(id)?;
                self.send(Command::BanPlayer { id, reason }).await?;
            }
            AdminCommand::Mute { id } => {
                self.require_player(id)?;
                self.send(Command::MutePlayer { id }).await?;
            }
            AdminCommand::Preset { name, repeat } => {
                let name = self.resolve_preset(&name)?;
                self.select_preset(PresetOverride {
                    name: Some(name),
                    repeat,
                    ..PresetOverride::default()
                })
                .await?;
            }
            AdminCommand::Mod(query) => {
                let mod_name = self.resolve_mod(&query)?;
                self.select_preset(PresetOverride {
                    mod_name: Some(mod_name),
                    ..PresetOverride::default()
                })
                .await?;
            }
            AdminCommand::Map(query) => {
                let level = self.resolve_level(&query)?;
                self.select_preset(PresetOverride {
                    level: Some(level),
                    ..PresetOverride::default()
                })
                .await?;
            }
            AdminCommand::LoadingTime(loading_time) => {
                self.select_preset(PresetOverride {
                    loading_time: Some(loading_time),
                    ..PresetOverride::default()
                })
                .await?;
            }
            AdminCommand::Team { id, team } => {
                let key = self.require_player(id)?;
                self.move_to_team(key, team).await?;
            }
            AdminCommand::Start => {
                for line in self.send(Command::StartGame).await? {
                    warn!(error = %line, "Engine refused to start the game");
                }
            }
            AdminCommand::Stop => {
                self.send(Command::GotoLobby).await?;
            }
            AdminCommand::Pause => {
                self.script_paused = true;
                self.private(issuer.id, "Session script paused").await?;
            }
            AdminCommand::Unpause => {
                self.script_paused = false;
                self.private(issuer.id, "Session script continues").await?;
            }
            AdminCommand::SetVar { name, value } => {
                self.send(Command::SetVar { name, value }).await?;
            }
            AdminCommand::Authorize { id } => {
                let key = self.require_player(id)?;
                if self.roster.grant_admin(key) {
                    let admin_name = self.player_name(issuer);
                    let target_name = self.player_name(key);
                    info!(target: "admin", id, name = %target_name, by = %admin_name, "Added to admins");
                    self.send(Command::AuthorizePlayer { id }).await?;
                    let hint = format!(
                        "{} made you admin! Type {}help for commands",
                        admin_name, self.policy.admin_prefix
                    );
                    self.private(id, hint).await?;
                    self.private(issuer.id, format!("{} added to admins.", target_name))
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn run_user_command(
        &mut self,
        sender: PlayerKey,
        command: UserCommand,
    ) -> Result<(), SessionError> {
        let disabled = (command.needs_voting() && !self.policy.voting)
            || (command.needs_ranking() && !self.policy.ranking)
            || (matches!(command, UserCommand::Team(_)) && !self.policy.allow_team_change);
        if disabled {
            return Err(CommandError::Unknown(format!("{:?}", command)).into());
        }

        let id = sender.id;
        match command {
            UserCommand::Help => {
                let help = UserHelp {
                    allow_team_change: self.policy.allow_team_change,
                    max_teams: self.roster.max_teams(),
                    ranking: self.policy.ranking,
                    voting: self.policy.voting,
                };
                for line in help.lines(&self.policy.user_prefix) {
                    self.private(id, line).await?;
                }
            }
            UserCommand::Team(team) => {
                if self.state == SessionState::Playing {
                    return Err(CommandError::TeamChangeWhilePlaying.into());
                }
                self.move_to_team(sender, team).await?;
            }
            UserCommand::TopRank => {
                let lines: Vec<String> = self
                    .ranking
                    .top(TOP_RANK_COUNT)
                    .into_iter()
                    .map(|(rank, entry)| {
                        format!(
                            "{}. {}: {} kills, {} deaths, {} suicides",
                            rank, entry.name, entry.kills, entry.deaths, entry.suicides
                        )
                    })
                    .collect();
                if lines.is_empty() {
                    self.private(id, "Nobody is ranked yet").await?;
                }
                for line in lines {
                    self.private(id, line).await?;
                }
            }
            UserCommand::Rank(name) => {
                let name = name.unwrap_or_else(|| self.player_name(sender));
                let reply = match self.ranking.rank_of(&name) {
                    Some((rank, entry)) => format!(
                        "{}: rank {}, {} kills, {} deaths, {} suicides",
                        entry.name, rank, entry.kills, entry.deaths, entry.suicides
                    ),
                    None => format!("{} is not ranked", name),
                };
                self.private(id, reply).await?;
            }
            UserCommand::RankTotal => {
                let reply = format!("There are {} players in the ranking.", self.ranking.total());
                self.private(id, reply).await?;
            }
            UserCommand::VoteKick(target) => {
                let key = self.require_player(target)?;
                let description = format!("Kick {}: {}", target, self.player_name(key));
                self.start_vote(sender, VoteAction::KickPlayer(key), description)
                    .await?;
            }
            UserCommand::VoteMute(target) => {
                let key = self.require_player(target)?;
                let description = format!("Mute {}: {}", target, self.player_name(key));
                self.start_vote(sender, VoteAction::MutePlayer(key), description)
                    .await?;
            }
            UserCommand::VoteMod(query) => {
                let mod_name = self.resolve_mod(&query)?;
                let description = format!("Mod {}", mod_name);
                self.start_vote(sender, VoteAction::SelectMod(mod_name), description)
                    .await?;
            }
            UserCommand::VoteMap(query) => {
                let level = self.resolve_level(&query)?;
                let description = format!("Map {}", level);
                self.start_vote(sender, VoteAction::SelectLevel(level), description)
                    .await?;
            }
            UserCommand::VoteLoadingTime(loading_time) => {
                let description = format!("Loading time {}", loading_time);
                self.start_vote(sender, VoteAction::SetLoadingTime(loading_time), description)
                    .await?;
            }
            UserCommand::VotePreset(query) => {
                let name = self.resolve_preset(&query)?;
                let description = format!("Preset {}", name);
                self.start_vote(sender, VoteAction::SelectPreset(name), description)
                    .await?;
            }
            UserCommand::Yes => self.cast_vote(sender, VoteChoice::Yes).await?,
            UserCommand::No => self.cast_vote(sender, VoteChoice::No).await?,
        }
        Ok(())
    }

    async fn start_vote(
        &mut self,
        poster: PlayerKey,
        action: VoteAction,
        description: String,
    ) -> Result<(), SessionError> {
        let now = Instant::now();
        match self
            .votes
            .start(&mut self.roster, action, poster, description, now)
        {
            Ok(outcome) => {
                info!(id = poster.id, "Vote started");
                self.handle_vote_outcome(outcome).await
            }
            Err(rejection) => self.private(poster.id, rejection.to_string()).await,
        }
    }

    async fn cast_vote(&mut self, voter: PlayerKey, choice: VoteChoice) -> Result<(), SessionError> {
        let now = Instant::now();
        match self.votes.cast(&mut self.roster, voter, choice, now) {
            Some(outcome) => self.handle_vote_outcome(outcome).await,
            None => Ok(()),
        }
    }

    /// Settle the active vote after the roster changed
    pub(super) async fn reevaluate_vote(&mut self) -> Result<(), SessionError> {
        let outcome = self.votes.evaluate(&mut self.roster, Instant::now());
        self.handle_vote_outcome(outcome).await
    }

    async fn handle_vote_outcome(&mut self, outcome: VoteOutcome) -> Result<(), SessionError> {
        match outcome {
            VoteOutcome::Idle => Ok(()),
            VoteOutcome::Passed(action) => {
                info!(action = ?action, "Vote passed");
                self.run_vote_action(action).await
            }
            VoteOutcome::Failed { description } => {
                info!(description = %description, "Vote failed");
                self.chat(format!("Vote failed: {}", description)).await
            }
            VoteOutcome::Pending {
                description,
                voices_needed,
                secs_left,
            } => {
                let prefix = &self.policy.user_prefix;
                let tally = format!(
                    "Vote: {}, {} voices to go, {} seconds, say {}y or {}n",
                    description, voices_needed, secs_left, prefix, prefix
                );
                self.chat(tally).await
            }
        }
    }

    async fn run_vote_action(&mut self, action: VoteAction) -> Result<(), SessionError> {
        match action {
            VoteAction::KickPlayer(key) | VoteAction::MutePlayer(key)
                if self.roster.get(key).is_none() =>
            {
                warn!(id = key.id, "Vote target already left, dropping vote action");
                Ok(())
            }
            VoteAction::KickPlayer(key) => {
                self.block_rejoin(key.id).await?;
                self.kick(key.id, None).await
            }
            VoteAction::MutePlayer(key) => {
                self.send(Command::MutePlayer { id: key.id }).await?;
                Ok(())
            }
            VoteAction::SelectPreset(name) => {
                self.select_preset(PresetOverride {
                    name: Some(name),
                    ..PresetOverride::default()
                })
                .await
            }
            VoteAction::SelectMod(mod_name) => {
                self.select_preset(PresetOverride {
                    mod_name: Some(mod_name),
                    ..PresetOverride::default()
                })
                .await
            }
            VoteAction::SelectLevel(level) => {
                self.select_preset(PresetOverride {
                    level: Some(level),
                    ..PresetOverride::default()
                })
                .await
            }
            VoteAction::SetLoadingTime(loading_time) => {
                self.select_preset(PresetOverride {
                    loading_time: Some(loading_time),
                    ..PresetOverride::default()
                })
                .await
            }
        }
    }

    /// Change the next preset; applied at once in the lobby
    async fn select_preset(&mut self, changes: PresetOverride) -> Result<(), SessionError> {
        let Some(next) = self.scheduler.override_next(&self.catalog, &changes) else {
            warn!("No presets to override");
            return Ok(());
        };
        if self.state == SessionState::Lobby {
            self.activate_next_preset().await
        } else {
            self.chat(format!("{} will be selected for next game", next)).await
        }
    }

    async fn move_to_team(&mut self, key: PlayerKey, team: usize) -> Result<(), SessionError> {
        if !self.roster.set_team(key, team) {
            return Err(CommandError::InvalidTeam(team.to_string()).into());
        }
        self.send(Command::SetPlayerTeam { id: key.id, team }).await?;
        Ok(())
    }

    /// Refuse the player's address for the configured block time
    async fn block_rejoin(&mut self, id: EngineId) -> Result<(), SessionError> {
        if self.policy.kick_block.is_zero() {
            return Ok(());
        }
        let ip = parse_ip(&self.send(Command::GetPlayerIp(id)).await?);
        let until = Instant::now() + self.policy.kick_block;
        info!(id, ip = %ip, "Blocking rejoin");
        self.kick_blocks.insert(ip, until);
        Ok(())
    }

    fn require_player(&self, id: EngineId) -> Result<PlayerKey, CommandError> {
        self.roster.key_of(id).ok_or(CommandError::UnknownPlayer(id))
    }

    fn player_name(&self, key: PlayerKey) -> String {
        self.roster.get(key).map(|p| p.name.clone()).unwrap_or_default()
    }

    fn resolve_preset(&self, query: &str) -> Result<String, CommandError> {
        self.catalog
            .find_preset(query)
            .map(str::to_string)
            .ok_or(CommandError::InvalidPreset)
    }

    fn resolve_mod(&self, query: &str) -> Result<String, CommandError> {
        self.catalog
            .find_mod(query)
            .map(str::to_string)
            .ok_or(CommandError::InvalidMod)
    }

    fn resolve_level(&self, query: &str) -> Result<String, CommandError> {
        self.catalog
            .find_level(query)
            .map(str::to_string)
            .ok_or(CommandError::InvalidMap)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{in_lobby, join, say};
    use super::*;
    use crate::config::SessionPolicy;
    use crate::engine::mock::MockLink;
    use crate::engine::Signal;
    use std::time::Duration;

    async fn lobby_with_admin(players: u32) -> SessionController<MockLink> {
        let mut controller = in_lobby(SessionPolicy::default(), players).await;
        controller.handle_signal(Signal::PlayerAuthorized { id: 0 }).await.unwrap();
        controller.link_mut().take_sent();
        controller
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_admin_cannot_use_admin_commands() {
        let mut controller = in_lobby(SessionPolicy::default(), 2).await;
        say(&mut controller, 1, "//kick 0").await;
        assert!(controller.link_mut().kicks().is_empty());
        // Plain chat and foreign prefixes are ignored
        assert!(controller.link_mut().private_to(1).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_commands_are_reported_privately() {
        let mut controller = lobby_with_admin(2).await;
        say(&mut controller, 0, "//frobnicate").await;
        say(&mut controller, 0, "//map nowhere").await;
        say(&mut controller, 1, "!dance").await;
        say(&mut controller, 1, "!kick 42").await;

        assert_eq!(
            controller.link_mut().private_to(0),
            vec!["Invalid admin command".to_string(), "Invalid map name".to_string()]
        );
        assert_eq!(
            controller.link_mut().private_to(1),
            vec!["Invalid user command".to_string(), "No player with id 42".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_falls_back_to_user_commands() {
        let mut controller = lobby_with_admin(2).await;
        say(&mut controller, 0, "!ranktotal").await;
        assert_eq!(
            controller.link_mut().private_to(0),
            vec!["There are 0 players in the ranking.".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_preset_applies_in_lobby() {
        let mut controller = lobby_with_admin(2).await;
        say(&mut controller, 0, "//preset rif").await;

        let chats = controller.link_mut().chats();
        assert_eq!(chats, vec!["Preset Rifles".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preset_change_while_playing_is_deferred() {
        let mut controller = lobby_with_admin(2).await;
        controller.handle_signal(Signal::GameStarted).await.unwrap();
        say(&mut controller, 0, "//map dirt").await;

        assert_eq!(
            controller.link_mut().chats(),
            vec!["Preset Rifles map Dirt.lxl will be selected for next game".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_authorize_and_team() {
        let mut controller = lobby_with_admin(2).await;
        say(&mut controller, 0, "//authorize 1").await;
        assert!(controller.roster().by_id(1).unwrap().is_admin);
        assert_eq!(
            controller.link_mut().private_to(1),
            vec!["worm0 made you admin! Type //help for commands".to_string()]
        );

        say(&mut controller, 0, "//team 1 r").await;
        assert_eq!(controller.roster().by_id(1).unwrap().team, 1);
        say(&mut controller, 0, "//team 1 y").await;
        assert_eq!(
            controller.link_mut().private_to(0).last().map(String::as_str),
            Some("Invalid team 3")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_team_refused_while_playing() {
        let mut controller = in_lobby(SessionPolicy::default(), 2).await;
        say(&mut controller, 1, "!team r").await;
        assert_eq!(controller.roster().by_id(1).unwrap().team, 1);

        controller.handle_signal(Signal::GameStarted).await.unwrap();
        say(&mut controller, 1, "!team b").await;
        assert_eq!(controller.roster().by_id(1).unwrap().team, 1);
        assert_eq!(
            controller.link_mut().private_to(1),
            vec!["You cannot change team when playing".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_vote_kick_passes_and_blocks_rejoin() {
        let mut controller = in_lobby(SessionPolicy::default(), 4).await;
        controller.link_mut().ips.insert(3, "10.1.1.1".to_string());

        say(&mut controller, 0, "!kick 3").await;
        assert_eq!(
            controller.link_mut().chats(),
            vec!["Vote: Kick 3: worm3, 2 voices to go, 40 seconds, say !y or !n".to_string()]
        );

        say(&mut controller, 1, "!y").await;
        say(&mut controller, 2, "!yes").await;
        assert_eq!(controller.link_mut().kicks(), vec![(3, None)]);
        assert!(controller.votes.active().is_none());

        controller.handle_signal(Signal::PlayerLeft { id: 3 }).await.unwrap();
        controller.link_mut().ips.insert(7, "10.1.1.1".to_string());
        join(&mut controller, 7).await;
        assert_eq!(
            controller.link_mut().kicks().last(),
            Some(&(7, Some("You can join in 6 minutes".to_string())))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_vote_fails_and_poster_cools_down() {
        let mut controller = in_lobby(SessionPolicy::default(), 4).await;

        say(&mut controller, 0, "!lt 50").await;
        for id in 1..4 {
            say(&mut controller, id, "!n").await;
        }
        assert_eq!(
            controller.link_mut().chats().last().map(String::as_str),
            Some("Vote failed: Loading time 50")
        );

        tokio::time::advance(Duration::from_secs(10)).await;
        say(&mut controller, 0, "!lt 60").await;
        assert_eq!(
            controller.link_mut().private_to(0),
            vec!["You cannot add vote for 70 seconds".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_vote_is_rejected_while_running() {
        let mut controller = in_lobby(SessionPolicy::default(), 4).await;
        say(&mut controller, 0, "!map castle").await;
        tokio::time::advance(Duration::from_secs(15)).await;
        say(&mut controller, 1, "!mod rifles").await;

        assert_eq!(
            controller.link_mut().private_to(1),
            vec!["Previous vote still running, 25 seconds left".to_string()]
        );
        let vote = controller.votes.active().unwrap();
        assert_eq!(vote.action, VoteAction::SelectLevel("Castle.lxl".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_vote_target_leaving_drops_action() {
        let mut controller = in_lobby(SessionPolicy::default(), 3).await;
        say(&mut controller, 0, "!mute 2").await;
        controller.handle_signal(Signal::PlayerLeft { id: 2 }).await.unwrap();
        join(&mut controller, 2).await;
        say(&mut controller, 1, "!y").await;

        assert_eq!(controller.link_mut().count(|c| matches!(c, Command::MutePlayer { .. })), 0);
        assert!(controller.votes.active().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_voting_disabled_rejects_proposals() {
        let policy = SessionPolicy {
            voting: false,
            ..SessionPolicy::default()
        };
        let mut controller = in_lobby(policy, 2).await;
        say(&mut controller, 0, "!kick 1").await;

        assert!(controller.votes.active().is_none());
        assert_eq!(
            controller.link_mut().private_to(0),
            vec!["Invalid user command".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rank_queries() {
        let mut controller = in_lobby(SessionPolicy::default(), 2).await;
        controller
            .handle_signal(Signal::PlayerDied { deader: 1, killer: 0 })
            .await
            .unwrap();

        say(&mut controller, 1, "!rank").await;
        say(&mut controller, 1, "!rank worm0").await;
        say(&mut controller, 1, "!rank nobody").await;
        assert_eq!(
            controller.link_mut().private_to(1),
            vec![
                "worm1: rank 2, 0 kills, 1 deaths, 0 suicides".to_string(),
                "worm0: rank 1, 1 kills, 0 deaths, 0 suicides".to_string(),
                "nobody is not ranked".to_string(),
            ]
        );

        say(&mut controller, 0, "!toprank").await;
        assert_eq!(
            controller.link_mut().private_to(0)[0],
            "1. worm0: 1 kills, 0 deaths, 0 suicides"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_flood_is_dropped() {
        let policy = SessionPolicy {
            command_rate_limit: 2,
            ..SessionPolicy::default()
        };
        let mut controller = in_lobby(policy, 1).await;
        for _ in 0..5 {
            say(&mut controller, 0, "!ranktotal").await;
        }
        assert_eq!(controller.link_mut().private_to(0).len(), 2);
    }
}
