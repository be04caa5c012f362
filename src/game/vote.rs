//! Quorum voting over the live roster

use std::time::Duration;
use tokio::time::Instant;

use super::roster::{PlayerKey, Roster, VoteChoice};
use crate::util::time::secs_until;

/// Deferred action executed when a vote passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteAction {
    KickPlayer(PlayerKey),
    MutePlayer(PlayerKey),
    SelectPreset(String),
    SelectMod(String),
    SelectLevel(String),
    SetLoadingTime(u32),
}

/// How votes other than "yes" weigh in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteCounting {
    /// Only "yes" counts; everyone else may still come around
    YesOnly,
    /// "no" cancels a "yes"; only silent players are undecided
    Net,
}

/// Voting parameters
#[derive(Debug, Clone)]
pub struct VotePolicy {
    /// How long a vote stays open
    pub window: Duration,
    /// Share of connected players needed, in percent
    pub percent: u32,
    pub counting: VoteCounting,
}

impl Default for VotePolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(40),
            percent: 51,
            counting: VoteCounting::Net,
        }
    }
}

/// The vote currently running
#[derive(Debug, Clone)]
pub struct Vote {
    pub action: VoteAction,
    pub poster: PlayerKey,
    pub description: String,
    pub started_at: Instant,
}

/// Vote counts against the live roster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub affirmative: i64,
    pub undecided: usize,
    pub needed: usize,
}

/// What the caller has to do after an evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// No vote is running
    Idle,
    /// Quorum reached: run the action
    Passed(VoteAction),
    /// Window elapsed or quorum out of reach
    Failed { description: String },
    /// Still open
    Pending {
        description: String,
        voices_needed: i64,
        secs_left: u64,
    },
}

/// Why a vote could not be started
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoteRejection {
    #[error("Previous vote still running, {secs_left} seconds left")]
    StillRunning { secs_left: u64 },

    #[error("You cannot add vote for {secs_left} seconds")]
    Cooldown { secs_left: u64 },

    #[error("Unknown player")]
    UnknownPoster,
}

/// Quorum for `total` players at `percent`, rounded up
pub fn required_votes(total: usize, percent: u32) -> usize {
    (total * percent as usize).div_ceil(100)
}

/// Holds at most one vote at a time
pub struct VotingEngine {
    policy: VotePolicy,
    active: Option<Vote>,
}

impl VotingEngine {
    pub fn new(policy: VotePolicy) -> Self {
        Self {
            policy,
            active: None,
        }
    }

    #[cfg(test)]
    pub fn active(&self) -> Option<&Vote> {
        self.active.as_ref()
    }

    /// Open a vote on behalf of `poster` and evaluate it right away
    pub fn start(
        &mut self,
        roster: &mut Roster,
        action: VoteAction,
        poster: PlayerKey,
        description: String,
        now: Instant,
    ) -> Result<VoteOutcome, VoteRejection> {
        if let Some(vote) = &self.active {
            let closes_at = vote.started_at + self.policy.window;
            if now < closes_at {
                return Err(VoteRejection::StillRunning {
                    secs_left: secs_until(closes_at, now),
                });
            }
        }

        let cooldown = roster
            .get(poster)
            .ok_or(VoteRejection::UnknownPoster)?
            .failed_vote_cooldown_until;
        if let Some(until) = cooldown {
            if now < until {
                return Err(VoteRejection::Cooldown {
                    secs_left: secs_until(until, now),
                });
            }
        }

        roster.reset_votes();
        if let Some(player) = roster.get_mut(poster) {
            player.vote_choice = VoteChoice::Yes;
        }
        self.active = Some(Vote {
            action,
            poster,
            description,
            started_at: now,
        });

        Ok(self.evaluate(roster, now))
    }

    /// Record a player's choice; `None` when it did not change
    pub fn cast(
        &mut self,
        roster: &mut Roster,
        key: PlayerKey,
        choice: VoteChoice,
        now: Instant,
    ) -> Option<VoteOutcome> {
        let player = roster.get_mut(key)?;
        if player.vote_choice == choice {
            return None;
        }
        player.vote_choice = choice;
        Some(self.evaluate(roster, now))
    }

    pub fn tally(&self, roster: &Roster) -> Tally {
        let mut yes = 0i64;
        let mut no = 0i64;
        let mut not_voted = 0usize;
        for player in roster.iter() {
            match player.vote_choice {
                VoteChoice::Yes => yes += 1,
                VoteChoice::No => no += 1,
                VoteChoice::NotVoted => not_voted += 1,
            }
        }

        let (affirmative, undecided) = match self.policy.counting {
            VoteCounting::YesOnly => (yes, roster.len() - yes as usize),
            VoteCounting::Net => (yes - no, not_voted),
        };

        Tally {
            affirmative,
            undecided,
            needed: required_votes(roster.len(), self.policy.percent),
        }
    }

    /// Settle the active vote against the current roster
    pub fn evaluate(&mut self, roster: &mut Roster, now: Instant) -> VoteOutcome {
        let Some(vote) = &self.active else {
            return VoteOutcome::Idle;
        };

        let tally = self.tally(roster);
        let needed = tally.needed as i64;
        let closes_at = vote.started_at + self.policy.window;

        if tally.affirmative >= needed {
            let vote = self.active.take().map(|v| v.action);
            return vote.map_or(VoteOutcome::Idle, VoteOutcome::Passed);
        }

        let unreachable = needed - tally.affirmative > tally.undecided as i64;
        if now >= closes_at || unreachable {
            let Some(vote) = self.active.take() else {
                return VoteOutcome::Idle;
            };
            // A poster who left has no cooldown to carry
            if let Some(poster) = roster.get_mut(vote.poster) {
                poster.failed_vote_cooldown_until = Some(now + self.policy.window * 2);
            }
            return VoteOutcome::Failed {
                description: vote.description,
            };
        }

        VoteOutcome::Pending {
            description: vote.description.clone(),
            voices_needed: needed - tally.affirmative,
            secs_left: secs_until(closes_at, now),
        }
    }
}
