//! Player roster: team balancing, ping history and generation-stamped identities

use std::collections::{BTreeMap, VecDeque};
use tokio::time::Instant;

use crate::engine::EngineId;

/// Number of ping samples averaged before enforcement kicks in
pub const PING_WINDOW: usize = 25;

/// Largest team count the engine supports
pub const MAX_TEAMS_LIMIT: usize = 4;

/// Lives value meaning eliminated
pub const LIVES_OUT: i32 = -1;

/// Roster identity of one player occurrence
///
/// The engine reuses numeric ids; the generation tells successive occupants
/// of the same id apart so a stale key never reaches a newcomer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerKey {
    pub id: EngineId,
    pub generation: u64,
}

/// A player's stance on the active vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteChoice {
    #[default]
    NotVoted,
    Yes,
    No,
}

/// Connected player (derived state only, the engine owns the real one)
#[derive(Debug, Clone)]
pub struct Player {
    pub key: PlayerKey,
    pub name: String,
    pub team: usize,
    pub is_admin: bool,
    /// Newest first
    pub ping_samples: VecDeque<u32>,
    pub lives: i32,
    pub alive: bool,
    pub vote_choice: VoteChoice,
    pub failed_vote_cooldown_until: Option<Instant>,
}

impl Player {
    fn new(key: PlayerKey, name: String) -> Self {
        Self {
            key,
            name,
            team: 0,
            is_admin: false,
            ping_samples: VecDeque::with_capacity(PING_WINDOW + 1),
            lives: LIVES_OUT,
            alive: false,
            vote_choice: VoteChoice::NotVoted,
            failed_vote_cooldown_until: None,
        }
    }

    /// Push a ping sample, returning the window mean once the window is full
    pub fn record_ping(&mut self, ping: u32) -> Option<f64> {
        self.ping_samples.push_front(ping);
        if self.ping_samples.len() > PING_WINDOW {
            self.ping_samples.pop_back();
        }
        self.average_ping()
    }

    /// Mean of a full ping window
    pub fn average_ping(&self) -> Option<f64> {
        if self.ping_samples.len() < PING_WINDOW {
            return None;
        }
        let sum: u64 = self.ping_samples.iter().map(|&p| p as u64).sum();
        Some(sum as f64 / self.ping_samples.len() as f64)
    }
}

/// Strip characters the tab-delimited ranking files cannot hold
pub fn sanitize_name(raw: &str) -> String {
    raw.replace('\t', " ").trim().to_string()
}

/// Result of a `newworm` signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joined {
    /// Fresh roster entry
    New(PlayerKey),
    /// The id was already present, only the name changed
    Renamed(PlayerKey),
}

impl Joined {
    pub fn key(&self) -> PlayerKey {
        match self {
            Joined::New(key) | Joined::Renamed(key) => *key,
        }
    }
}

/// All currently connected players
pub struct Roster {
    players: BTreeMap<EngineId, Player>,
    next_generation: u64,
    max_teams: usize,
}

impl Roster {
    pub fn new(max_teams: usize) -> Self {
        Self {
            players: BTreeMap::new(),
            next_generation: 1,
            max_teams: max_teams.clamp(1, MAX_TEAMS_LIMIT),
        }
    }

    /// Add a player, or rename the current occupant of `id`
    pub fn join(&mut self, id: EngineId, raw_name: &str) -> Joined {
        let name = sanitize_name(raw_name);
        if let Some(player) = self.players.get_mut(&id) {
            player.name = name;
            return Joined::Renamed(player.key);
        }

        let key = PlayerKey {
            id,
            generation: self.next_generation,
        };
        self.next_generation += 1;
        self.players.insert(id, Player::new(key, name));
        Joined::New(key)
    }

    pub fn remove(&mut self, id: EngineId) -> Option<Player> {
        self.players.remove(&id)
    }

    /// Look up a player by key; stale keys resolve to nothing
    pub fn get(&self, key: PlayerKey) -> Option<&Player> {
        self.players.get(&key.id).filter(|p| p.key == key)
    }

    pub fn get_mut(&mut self, key: PlayerKey) -> Option<&mut Player> {
        self.players.get_mut(&key.id).filter(|p| p.key == key)
    }

    pub fn by_id(&self, id: EngineId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn key_of(&self, id: EngineId) -> Option<PlayerKey> {
        self.players.get(&id).map(|p| p.key)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Players in id order
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn keys(&self) -> Vec<PlayerKey> {
        self.players.values().map(|p| p.key).collect()
    }

    pub fn alive_keys(&self) -> Vec<PlayerKey> {
        self.players
            .values()
            .filter(|p| p.alive)
            .map(|p| p.key)
            .collect()
    }

    pub fn has_admins(&self) -> bool {
        self.players.values().any(|p| p.is_admin)
    }

    pub fn max_teams(&self) -> usize {
        self.max_teams
    }

    /// Players per team
    pub fn team_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.max_teams];
        for player in self.players.values() {
            if let Some(count) = counts.get_mut(player.team) {
                *count += 1;
            }
        }
        counts
    }

    /// Smallest team counting every player, the joiner included at its
    /// current team; the first minimum wins ties
    pub fn balanced_team(&self) -> usize {
        let counts = self.team_counts();
        let mut best = 0;
        for (team, &count) in counts.iter().enumerate() {
            if count < counts[best] {
                best = team;
            }
        }
        best
    }

    /// Move a player to `team`; false for stale keys or out-of-range teams
    pub fn set_team(&mut self, key: PlayerKey, team: usize) -> bool {
        if team >= self.max_teams {
            return false;
        }
        match self.get_mut(key) {
            Some(player) => {
                player.team = team;
                true
            }
            None => false,
        }
    }

    /// Grant admin rights; true only when newly granted
    pub fn grant_admin(&mut self, key: PlayerKey) -> bool {
        match self.get_mut(key) {
            Some(player) if !player.is_admin => {
                player.is_admin = true;
                true
            }
            _ => false,
        }
    }

    pub fn mark_dead(&mut self, id: EngineId) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                player.lives = (player.lives - 1).max(LIVES_OUT);
                player.alive = false;
                true
            }
            None => false,
        }
    }

    pub fn mark_alive(&mut self, id: EngineId) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                player.alive = true;
                true
            }
            None => false,
        }
    }

    /// Record a ping for a living player; returns the window mean once full
    ///
    /// Non-positive pings and dead players leave the window untouched.
    pub fn record_ping(&mut self, key: PlayerKey, ping: u32) -> Option<f64> {
        let player = self.get_mut(key)?;
        if !player.alive || ping == 0 {
            return None;
        }
        player.record_ping(ping)
    }

    pub fn clear_pings(&mut self, key: PlayerKey) {
        if let Some(player) = self.get_mut(key) {
            player.ping_samples.clear();
        }
    }

    pub fn reset_votes(&mut self) {
        for player in self.players.values_mut() {
            player.vote_choice = VoteChoice::NotVoted;
        }
    }
}
