//! Match actor message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::{
    game::{
        constants::MAX_SEATS,
        entities::{JoinMetadata, MatchId, MatchState, Phase, Presence, UserId, Winner},
    },
    gateway::Outbound,
    session::{JoinDecision, TickReport},
};

/// Messages that can be sent to a MatchActor
#[derive(Debug)]
pub enum MatchMessage {
    /// Join attempt followed by the join itself when accepted
    Join {
        presence: Presence,
        metadata: JoinMetadata,
        response: oneshot::Sender<JoinDecision>,
    },

    /// Presence left; responds with whether it held a seat
    Leave {
        user_id: UserId,
        response: oneshot::Sender<bool>,
    },

    /// Raw client message, queued until the next tick
    Data {
        user_id: UserId,
        op_code: i64,
        data: Vec<u8>,
    },

    /// Out-of-band single move, answered with a JSON ack
    Signal {
        data: String,
        response: oneshot::Sender<String>,
    },

    /// Current match state
    Snapshot {
        response: oneshot::Sender<MatchState>,
    },

    /// Process queued moves now instead of waiting for the interval
    Tick {
        response: oneshot::Sender<TickReport>,
    },

    /// Route broadcasts for `user_id` to `sender`; answers `false` when the
    /// user is already seated or subscribed
    Subscribe {
        user_id: UserId,
        sender: mpsc::Sender<Outbound>,
        response: oneshot::Sender<bool>,
    },

    /// Stop routing broadcasts for `user_id`
    Unsubscribe { user_id: UserId },

    /// Final state, then the actor stops
    Terminate {
        grace: Duration,
        response: oneshot::Sender<MatchState>,
    },
}

/// Lightweight view of a match published by its actor after every change.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub label: String,
    pub phase: Phase,
    pub seat_count: usize,
    pub players: Vec<UserId>,
    pub winner: Winner,
    pub moves_accepted: u64,
    pub moves_rejected: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchSummary {
    pub fn new(state: &MatchState) -> Self {
        let now = Utc::now();
        Self {
            match_id: state.match_id.clone(),
            label: state.label.clone(),
            phase: state.phase,
            seat_count: state.seats.len(),
            players: state.user_ids(),
            winner: state.winner.clone(),
            moves_accepted: 0,
            moves_rejected: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh from `state`, keeping the counters and creation time.
    pub fn refresh(&mut self, state: &MatchState) {
        self.phase = state.phase;
        self.seat_count = state.seats.len();
        self.players = state.user_ids();
        self.winner = state.winner.clone();
        self.updated_at = Utc::now();
    }

    /// Waiting for players with a free seat.
    pub fn is_joinable(&self) -> bool {
        self.phase == Phase::WaitingForPlayers && self.seat_count < MAX_SEATS
    }

    /// Time since the last change.
    pub fn idle_for(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.updated_at)
            .to_std()
            .unwrap_or_default()
    }
}
