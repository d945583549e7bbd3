//! Per-match state machine.
//!
//! A [`MatchSession`] owns one match's seats, board, turn and phase. The
//! host calls into it for one event at a time (join attempt, join, leave,
//! tick, signal, terminate) and never concurrently for the same match, so
//! the session holds no locks. Every state-changing event ends with the
//! full [`MatchState`] being handed to the [`BroadcastGateway`].
//!
//! ```text
//! WaitingForPlayers --2nd seat--> InProgress --win/draw/leave--> Finished
//! ```

pub mod config;

pub use config::{ConfigError, MatchConfig};

use std::{collections::HashMap, time::Duration};

use thiserror::Error;

use crate::{
    game::{
        constants::MAX_SEATS,
        entities::{
            JoinMetadata, MatchId, MatchState, Phase, Presence, Seat, Symbol, TurnState, UserId,
            Winner,
        },
        rules::{self, MoveError, Outcome},
    },
    gateway::{BroadcastGateway, GatewayError},
    net::messages::{OpCode, RejectionNotice, SignalAck, SignalMove},
};

/// What the match factory hands back to the host.
#[derive(Debug)]
pub struct MatchInit {
    pub session: MatchSession,
    pub tick_rate_hz: u32,
    pub label: String,
}

/// Answer to a join attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinDecision {
    Accept,
    Reject(String),
}

impl JoinDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// A move submission collected by the host between two ticks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingMove {
    pub user_id: UserId,
    pub row: i32,
    pub col: i32,
}

impl PendingMove {
    pub fn new(user_id: impl Into<UserId>, row: i32, col: i32) -> Self {
        Self {
            user_id: user_id.into(),
            row,
            col,
        }
    }
}

/// A move the validator refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedMove {
    pub user_id: UserId,
    pub row: i32,
    pub col: i32,
    pub error: MoveError,
}

/// Summary of one batch of moves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub accepted: usize,
    pub rejected: Vec<RejectedMove>,
    /// The batch moved the match to `Finished`.
    pub finished: bool,
}

/// The batch was applied but its broadcast failed. State has already
/// moved, so the report travels with the error.
#[derive(Debug, Error)]
#[error("moves applied but broadcast failed: {source}")]
pub struct TickError {
    pub report: TickReport,
    #[source]
    pub source: GatewayError,
}

#[derive(Debug)]
pub struct MatchSession {
    state: MatchState,
    config: MatchConfig,
    next_join_order: u32,
    /// Metadata of accepted join attempts, consumed by `join`.
    pending_metadata: HashMap<UserId, JoinMetadata>,
    terminated: bool,
}

impl MatchSession {
    /// Match factory: a fresh session waiting for players, plus the tick
    /// rate and label the host should schedule it with.
    pub fn init(match_id: MatchId, config: MatchConfig) -> Result<MatchInit, ConfigError> {
        config.validate()?;

        let tick_rate_hz = config.tick_rate_hz;
        let label = config.label.clone();
        let session = Self {
            state: MatchState::new(match_id, label.clone()),
            config,
            next_join_order: 0,
            pending_metadata: HashMap::new(),
            terminated: false,
        };

        log::info!(
            "Match {} initialized ({label}, {tick_rate_hz} Hz)",
            session.state.match_id
        );

        Ok(MatchInit {
            session,
            tick_rate_hz,
            label,
        })
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn match_id(&self) -> &MatchId {
        &self.state.match_id
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Decide whether `presence` may take a seat. Nothing is mutated
    /// except remembering the join metadata of an accepted attempt.
    pub fn join_attempt(&mut self, presence: &Presence, metadata: JoinMetadata) -> JoinDecision {
        if self.state.phase != Phase::WaitingForPlayers || !self.state.has_free_seat() {
            return JoinDecision::Reject("match full or already started".to_string());
        }

        if self.state.is_seated(&presence.user_id) {
            return JoinDecision::Reject("already joined".to_string());
        }

        self.pending_metadata
            .insert(presence.user_id.clone(), metadata);
        JoinDecision::Accept
    }

    /// Seat each accepted presence. The second seat starts the match.
    pub fn join(
        &mut self,
        gateway: &mut dyn BroadcastGateway,
        presences: &[Presence],
    ) -> Result<(), GatewayError> {
        let mut started = false;

        for presence in presences {
            if self.state.phase != Phase::WaitingForPlayers || !self.state.has_free_seat() {
                log::warn!(
                    "Match {}: ignoring join of {} (match full or already started)",
                    self.state.match_id,
                    presence.user_id
                );
                continue;
            }

            if self.state.is_seated(&presence.user_id) {
                continue;
            }

            let metadata = self
                .pending_metadata
                .remove(&presence.user_id)
                .unwrap_or_default();
            let display_name = metadata
                .display_name
                .or_else(|| (!presence.username.is_empty()).then(|| presence.username.clone()))
                .unwrap_or_else(|| presence.user_id.to_string());
            let symbol = if self.state.seats.is_empty() {
                Symbol::X
            } else {
                Symbol::O
            };

            self.state.seats.push(Seat {
                user_id: presence.user_id.clone(),
                display_name,
                symbol,
                join_order: self.next_join_order,
            });
            self.next_join_order += 1;

            log::info!(
                "Match {}: {} took seat {}",
                self.state.match_id,
                presence.user_id,
                self.state.seats.len()
            );

            if self.state.seats.len() == MAX_SEATS {
                self.start();
                started = true;
            }
        }

        if started {
            self.broadcast_snapshot(gateway, OpCode::MatchStarted)?;
        }
        Ok(())
    }

    /// Remove the seats of departing presences. A departure while the
    /// match is in progress ends it as a draw.
    pub fn leave(
        &mut self,
        gateway: &mut dyn BroadcastGateway,
        presences: &[Presence],
    ) -> Result<(), GatewayError> {
        let mut removed = false;

        for presence in presences {
            self.pending_metadata.remove(&presence.user_id);
            if let Some(idx) = self
                .state
                .seats
                .iter()
                .position(|seat| seat.user_id == presence.user_id)
            {
                self.state.seats.remove(idx);
                removed = true;
                log::info!(
                    "Match {}: {} left during {}",
                    self.state.match_id,
                    presence.user_id,
                    self.state.phase
                );
            }
        }

        if removed && self.state.phase == Phase::InProgress {
            self.finish(Winner::Draw);
            self.broadcast_snapshot(gateway, OpCode::GameEnded)?;
        }
        Ok(())
    }

    /// Apply the moves collected since the previous tick, in order.
    pub fn tick(
        &mut self,
        gateway: &mut dyn BroadcastGateway,
        pending: Vec<PendingMove>,
    ) -> Result<TickReport, TickError> {
        if pending.is_empty() {
            return Ok(TickReport::default());
        }
        self.process_moves(gateway, pending)
    }

    /// Out-of-band single move. Goes through exactly the same batch path
    /// as [`MatchSession::tick`]. Returns a JSON ack.
    pub fn signal(&mut self, gateway: &mut dyn BroadcastGateway, data: &str) -> String {
        let mv = match SignalMove::decode(data) {
            Ok(mv) => mv,
            Err(e) => {
                log::warn!("Match {}: malformed signal: {e}", self.state.match_id);
                return SignalAck::rejected(format!("malformed signal: {e}")).to_json();
            }
        };

        let pending = PendingMove {
            user_id: mv.user_id,
            row: mv.row,
            col: mv.col,
        };
        let report = match self.process_moves(gateway, vec![pending]) {
            Ok(report) => report,
            Err(TickError { report, source }) => {
                log::warn!(
                    "Match {}: broadcast after signal failed: {source}",
                    self.state.match_id
                );
                report
            }
        };

        match report.rejected.first() {
            Some(rejected) => SignalAck::rejected(rejected.error.to_string()).to_json(),
            None => SignalAck::accepted().to_json(),
        }
    }

    /// Final state for registry bookkeeping. Safe to call repeatedly.
    pub fn terminate(&mut self, grace_period: Duration) -> MatchState {
        if !self.terminated {
            self.terminated = true;
            log::info!(
                "Match {} terminating in {} with {} seat(s), grace {:?}",
                self.state.match_id,
                self.state.phase,
                self.state.seats.len(),
                grace_period
            );
        }
        self.state.clone()
    }

    fn start(&mut self) {
        for (idx, seat) in self.state.seats.iter_mut().enumerate() {
            seat.symbol = if idx == 0 { Symbol::X } else { Symbol::O };
        }
        let first = &self.state.seats[0];
        self.state.turn = Some(TurnState {
            current_user_id: first.user_id.clone(),
            current_symbol: Symbol::X,
        });
        self.state.phase = Phase::InProgress;

        log::info!(
            "Match {} started: {} (X) vs {} (O)",
            self.state.match_id,
            self.state.seats[0].user_id,
            self.state.seats[1].user_id
        );
    }

    fn finish(&mut self, winner: Winner) {
        log::info!("Match {} finished: {:?}", self.state.match_id, winner);
        self.state.phase = Phase::Finished;
        self.state.winner = winner;
    }

    /// Shared by tick and signal.
    fn process_moves(
        &mut self,
        gateway: &mut dyn BroadcastGateway,
        moves: Vec<PendingMove>,
    ) -> Result<TickReport, TickError> {
        let mut report = TickReport::default();
        let was_finished = self.state.phase == Phase::Finished;

        for mv in moves {
            match rules::apply_move(&mut self.state, &mv.user_id, mv.row, mv.col) {
                Ok(symbol) => {
                    report.accepted += 1;
                    log::debug!(
                        "Match {}: {} placed {symbol} at ({}, {})",
                        self.state.match_id,
                        mv.user_id,
                        mv.row,
                        mv.col
                    );
                    self.evaluate_outcome();
                }
                Err(error) => {
                    log::debug!(
                        "Match {}: rejected move by {} at ({}, {}): {error}",
                        self.state.match_id,
                        mv.user_id,
                        mv.row,
                        mv.col
                    );
                    report.rejected.push(RejectedMove {
                        user_id: mv.user_id,
                        row: mv.row,
                        col: mv.col,
                        error,
                    });
                }
            }
        }
        report.finished = !was_finished && self.state.phase == Phase::Finished;

        let mut result = Ok(());
        if report.accepted > 0 {
            let op_code = if report.finished {
                OpCode::GameEnded
            } else {
                OpCode::MoveApplied
            };
            result = self.broadcast_snapshot(gateway, op_code);
        }

        if self.config.notify_rejections {
            for rejected in &report.rejected {
                if let Err(e) = self.notify_rejection(gateway, rejected) {
                    log::debug!("Match {}: rejection notice not delivered: {e}", self.state.match_id);
                }
            }
        }

        match result {
            Ok(()) => Ok(report),
            Err(source) => Err(TickError { report, source }),
        }
    }

    fn evaluate_outcome(&mut self) {
        match rules::detect_outcome(&self.state.board) {
            Outcome::Winner(symbol) => {
                let winner = self
                    .state
                    .seat_for_symbol(symbol)
                    .map(|seat| Winner::Player(seat.user_id.clone()))
                    .unwrap_or(Winner::Draw);
                self.finish(winner);
            }
            Outcome::Draw => self.finish(Winner::Draw),
            Outcome::None => {}
        }
    }

    fn broadcast_snapshot(
        &self,
        gateway: &mut dyn BroadcastGateway,
        op_code: OpCode,
    ) -> Result<(), GatewayError> {
        let payload = serde_json::to_vec(&self.state)?;
        gateway.broadcast_message(op_code, &payload, None, true)
    }

    fn notify_rejection(
        &self,
        gateway: &mut dyn BroadcastGateway,
        rejected: &RejectedMove,
    ) -> Result<(), GatewayError> {
        let notice = RejectionNotice {
            reason: rejected.error.to_string(),
            row: Some(rejected.row),
            col: Some(rejected.col),
        };
        let payload = serde_json::to_vec(&notice)?;
        let recipient = [rejected.user_id.clone()];
        gateway.broadcast_message(OpCode::MoveRejected, &payload, Some(&recipient), true)
    }
}

/// Private notice for a payload that never made it to the validator.
pub fn notify_malformed(
    gateway: &mut dyn BroadcastGateway,
    user_id: &UserId,
    reason: &str,
) -> Result<(), GatewayError> {
    let notice = RejectionNotice {
        reason: reason.to_string(),
        row: None,
        col: None,
    };
    let payload = serde_json::to_vec(&notice)?;
    let recipient = [user_id.clone()];
    gateway.broadcast_message(OpCode::MoveRejected, &payload, Some(&recipient), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        game::entities::{Board, Cell},
        gateway::{RecordingGateway, SubscriberGateway},
    };
    use tokio::sync::mpsc;

    fn new_session() -> MatchSession {
        MatchSession::init(MatchId::from("match-1"), MatchConfig::default())
            .unwrap()
            .session
    }

    fn seat(session: &mut MatchSession, gateway: &mut RecordingGateway, user: &str) {
        let presence = Presence::new(user, user);
        assert_eq!(
            session.join_attempt(&presence, JoinMetadata::default()),
            JoinDecision::Accept
        );
        session.join(gateway, &[presence]).unwrap();
    }

    fn started() -> (MatchSession, RecordingGateway) {
        let mut session = new_session();
        let mut gateway = RecordingGateway::new();
        seat(&mut session, &mut gateway, "alice");
        seat(&mut session, &mut gateway, "bob");
        gateway.clear();
        (session, gateway)
    }

    #[test]
    fn test_init_reports_tick_rate_and_label() {
        let init = MatchSession::init(
            MatchId::from("m"),
            MatchConfig {
                tick_rate_hz: 10,
                ..MatchConfig::default()
            },
        )
        .unwrap();
        assert_eq!(init.tick_rate_hz, 10);
        assert_eq!(init.label, "tic_tac_toe");
        assert_eq!(init.session.phase(), Phase::WaitingForPlayers);
        assert!(init.session.state().seats.is_empty());
        assert_eq!(init.session.state().board, Board::new());
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let config = MatchConfig {
            tick_rate_hz: 0,
            ..MatchConfig::default()
        };
        assert!(MatchSession::init(MatchId::from("m"), config).is_err());
    }

    #[test]
    fn test_first_join_keeps_waiting() {
        let mut session = new_session();
        let mut gateway = RecordingGateway::new();
        seat(&mut session, &mut gateway, "alice");

        assert_eq!(session.phase(), Phase::WaitingForPlayers);
        assert_eq!(session.state().seats.len(), 1);
        assert!(gateway.sent.is_empty());
    }

    #[test]
    fn test_second_join_starts_match() {
        let mut session = new_session();
        let mut gateway = RecordingGateway::new();
        seat(&mut session, &mut gateway, "alice");
        seat(&mut session, &mut gateway, "bob");

        let state = session.state();
        assert_eq!(state.phase, Phase::InProgress);
        assert_eq!(state.seats[0].symbol, Symbol::X);
        assert_eq!(state.seats[1].symbol, Symbol::O);
        assert_eq!(
            state.turn.as_ref().unwrap().current_user_id,
            UserId::new("alice")
        );
        assert_eq!(gateway.op_codes(), vec![OpCode::MatchStarted]);

        let snapshot: MatchState = gateway.last().unwrap().json().unwrap();
        assert_eq!(&snapshot, state);
    }

    #[test]
    fn test_join_attempt_rejected_when_started() {
        let (mut session, _) = started();
        let decision = session.join_attempt(&Presence::new("carol", "carol"), JoinMetadata::default());
        assert_eq!(
            decision,
            JoinDecision::Reject("match full or already started".to_string())
        );
    }

    #[test]
    fn test_join_attempt_rejects_duplicate_user() {
        let mut session = new_session();
        let mut gateway = RecordingGateway::new();
        seat(&mut session, &mut gateway, "alice");
        let decision = session.join_attempt(&Presence::new("alice", "alice"), JoinMetadata::default());
        assert!(!decision.is_accepted());
    }

    #[test]
    fn test_join_uses_metadata_display_name() {
        let mut session = new_session();
        let mut gateway = RecordingGateway::new();
        let presence = Presence::new("u1", "user-one");
        session.join_attempt(&presence, JoinMetadata::with_display_name("Alice"));
        session.join(&mut gateway, &[presence]).unwrap();
        assert_eq!(session.state().seats[0].display_name, "Alice");
    }

    #[test]
    fn test_batch_join_never_exceeds_two_seats() {
        let mut session = new_session();
        let mut gateway = RecordingGateway::new();
        let presences = [
            Presence::new("a", "a"),
            Presence::new("b", "b"),
            Presence::new("c", "c"),
        ];
        session.join(&mut gateway, &presences).unwrap();
        assert_eq!(session.state().seats.len(), 2);
        assert_eq!(gateway.op_codes(), vec![OpCode::MatchStarted]);
    }

    #[test]
    fn test_leave_while_waiting_only_removes_seat() {
        let mut session = new_session();
        let mut gateway = RecordingGateway::new();
        seat(&mut session, &mut gateway, "alice");
        session
            .leave(&mut gateway, &[Presence::new("alice", "alice")])
            .unwrap();

        assert_eq!(session.phase(), Phase::WaitingForPlayers);
        assert!(session.state().seats.is_empty());
        assert!(gateway.sent.is_empty());

        // The next pair still gets X for whoever is seated first.
        seat(&mut session, &mut gateway, "bob");
        seat(&mut session, &mut gateway, "carol");
        assert_eq!(session.state().seats[0].user_id, UserId::new("bob"));
        assert_eq!(session.state().seats[0].symbol, Symbol::X);
        assert_eq!(session.state().seats[1].join_order, 2);
    }

    #[test]
    fn test_leave_in_progress_is_draw() {
        let (mut session, mut gateway) = started();
        session
            .leave(&mut gateway, &[Presence::new("bob", "bob")])
            .unwrap();

        assert_eq!(session.phase(), Phase::Finished);
        assert_eq!(session.state().winner, Winner::Draw);
        assert_eq!(gateway.op_codes(), vec![OpCode::GameEnded]);
    }

    #[test]
    fn test_leave_of_unknown_presence_changes_nothing() {
        let (mut session, mut gateway) = started();
        session
            .leave(&mut gateway, &[Presence::new("stranger", "stranger")])
            .unwrap();
        assert_eq!(session.phase(), Phase::InProgress);
        assert!(gateway.sent.is_empty());
    }

    #[test]
    fn test_tick_without_moves_broadcasts_nothing() {
        let (mut session, mut gateway) = started();
        let report = session.tick(&mut gateway, vec![]).unwrap();
        assert_eq!(report, TickReport::default());
        assert!(gateway.sent.is_empty());
    }

    #[test]
    fn test_out_of_turn_move_rejected_privately() {
        let (mut session, mut gateway) = started();
        let before = session.state().clone();

        let report = session
            .tick(&mut gateway, vec![PendingMove::new("bob", 1, 1)])
            .unwrap();

        assert_eq!(report.accepted, 0);
        assert_eq!(report.rejected[0].error, MoveError::NotYourTurn);
        assert_eq!(session.state(), &before);
        assert_eq!(gateway.broadcasts().count(), 0);
        let notice = gateway.last().unwrap();
        assert_eq!(notice.op_code, OpCode::MoveRejected);
        assert_eq!(notice.recipients, Some(vec![UserId::new("bob")]));
    }

    #[test]
    fn test_rejection_notices_can_be_disabled() {
        let mut session = MatchSession::init(
            MatchId::from("quiet"),
            MatchConfig {
                notify_rejections: false,
                ..MatchConfig::default()
            },
        )
        .unwrap()
        .session;
        let mut gateway = RecordingGateway::new();
        seat(&mut session, &mut gateway, "alice");
        seat(&mut session, &mut gateway, "bob");
        gateway.clear();

        session
            .tick(&mut gateway, vec![PendingMove::new("bob", 0, 0)])
            .unwrap();
        assert!(gateway.sent.is_empty());
    }

    #[test]
    fn test_batch_applies_in_order_and_broadcasts_once() {
        let (mut session, mut gateway) = started();
        let report = session
            .tick(
                &mut gateway,
                vec![
                    PendingMove::new("alice", 0, 0),
                    PendingMove::new("bob", 1, 1),
                    PendingMove::new("bob", 2, 2),
                ],
            )
            .unwrap();

        assert_eq!(report.accepted, 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(session.state().board.get(0, 0), Some(Cell::X));
        assert_eq!(session.state().board.get(1, 1), Some(Cell::O));
        assert_eq!(session.state().board.get(2, 2), Some(Cell::Empty));
        assert_eq!(gateway.broadcasts().count(), 1);
        assert_eq!(gateway.sent[0].op_code, OpCode::MoveApplied);
    }

    #[test]
    fn test_winning_move_ends_game() {
        let (mut session, mut gateway) = started();
        let moves = vec![
            PendingMove::new("alice", 0, 0),
            PendingMove::new("bob", 1, 0),
            PendingMove::new("alice", 0, 1),
            PendingMove::new("bob", 1, 1),
            PendingMove::new("alice", 0, 2),
        ];
        let report = session.tick(&mut gateway, moves).unwrap();

        assert!(report.finished);
        assert_eq!(session.phase(), Phase::Finished);
        assert_eq!(session.state().winner, Winner::Player(UserId::new("alice")));
        assert_eq!(gateway.op_codes(), vec![OpCode::GameEnded]);
    }

    #[test]
    fn test_moves_after_win_in_same_batch_are_rejected() {
        let (mut session, mut gateway) = started();
        let moves = vec![
            PendingMove::new("alice", 0, 0),
            PendingMove::new("bob", 1, 0),
            PendingMove::new("alice", 0, 1),
            PendingMove::new("bob", 1, 1),
            PendingMove::new("alice", 0, 2),
            PendingMove::new("bob", 1, 2),
        ];
        let report = session.tick(&mut gateway, moves).unwrap();

        assert_eq!(report.accepted, 5);
        assert_eq!(report.rejected[0].error, MoveError::GameNotActive);
        assert_eq!(session.state().board.get(1, 2), Some(Cell::Empty));
        assert_eq!(session.state().winner, Winner::Player(UserId::new("alice")));
    }

    #[test]
    fn test_full_board_is_draw() {
        let (mut session, mut gateway) = started();
        // X O X / X O O / O X X
        let moves = vec![
            PendingMove::new("alice", 0, 0),
            PendingMove::new("bob", 0, 1),
            PendingMove::new("alice", 0, 2),
            PendingMove::new("bob", 1, 1),
            PendingMove::new("alice", 1, 0),
            PendingMove::new("bob", 1, 2),
            PendingMove::new("alice", 2, 1),
            PendingMove::new("bob", 2, 0),
            PendingMove::new("alice", 2, 2),
        ];
        let report = session.tick(&mut gateway, moves).unwrap();

        assert_eq!(report.accepted, 9);
        assert_eq!(session.state().winner, Winner::Draw);
        assert_eq!(session.phase(), Phase::Finished);
        assert_eq!(gateway.op_codes(), vec![OpCode::GameEnded]);
    }

    #[test]
    fn test_signal_shares_tick_rules() {
        let (mut session, mut gateway) = started();

        let ack = session.signal(&mut gateway, r#"{"user_id":"bob","row":0,"col":0}"#);
        assert_eq!(ack, r#"{"accepted":false,"reason":"not your turn"}"#);

        let ack = session.signal(&mut gateway, r#"{"user_id":"alice","row":0,"col":0}"#);
        assert_eq!(ack, r#"{"accepted":true}"#);
        assert_eq!(
            session.state().turn.as_ref().unwrap().current_user_id,
            UserId::new("bob")
        );

        let ack = session.signal(&mut gateway, r#"{"user_id":"bob","row":0,"col":0}"#);
        assert_eq!(ack, r#"{"accepted":false,"reason":"cell occupied"}"#);
    }

    #[test]
    fn test_malformed_signal_is_acked_without_mutation() {
        let (mut session, mut gateway) = started();
        let before = session.state().clone();
        let ack: SignalAck = serde_json::from_str(&session.signal(&mut gateway, "1,1")).unwrap();
        assert!(!ack.accepted);
        assert!(ack.reason.unwrap().starts_with("malformed signal"));
        assert_eq!(session.state(), &before);
        assert!(gateway.sent.is_empty());
    }

    #[test]
    fn test_tick_keeps_report_when_broadcast_fails() {
        let mut session = new_session();
        let mut gateway = SubscriberGateway::new();
        let (alice_tx, mut alice_rx) = mpsc::channel(8);
        let (bob_tx, _bob_rx) = mpsc::channel(1);
        gateway.subscribe(UserId::new("alice"), alice_tx);
        gateway.subscribe(UserId::new("bob"), bob_tx);

        // MatchStarted fills bob's channel.
        for user in ["alice", "bob"] {
            let presence = Presence::new(user, user);
            session.join_attempt(&presence, JoinMetadata::default());
            session.join(&mut gateway, &[presence]).unwrap();
        }

        let err = session
            .tick(&mut gateway, vec![PendingMove::new("alice", 1, 1)])
            .unwrap_err();
        assert_eq!(err.report.accepted, 1);
        assert!(err.report.rejected.is_empty());
        assert!(matches!(err.source, GatewayError::Undeliverable { dropped: 1 }));
        assert_eq!(session.state().board.get(1, 1), Some(Cell::X));

        // Subscribers with room still got the update.
        assert_eq!(alice_rx.try_recv().unwrap().op_code, OpCode::MatchStarted);
        assert_eq!(alice_rx.try_recv().unwrap().op_code, OpCode::MoveApplied);
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let (mut session, _) = started();
        let first = session.terminate(Duration::from_secs(5));
        let second = session.terminate(Duration::from_secs(0));
        assert_eq!(first, second);
        assert!(session.is_terminated());
        assert_eq!(first.phase, Phase::InProgress);
    }
}
