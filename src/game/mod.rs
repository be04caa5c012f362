//! Session game state: roster and voting

pub mod roster;
pub mod vote;

pub use roster::{PlayerKey, Roster, VoteChoice};
pub use vote::{VoteAction, VoteCounting, VoteOutcome, VotePolicy, VotingEngine};
