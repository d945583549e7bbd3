//! Match actor implementation with async message handling.

use std::collections::HashMap;

use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Duration, MissedTickBehavior, interval},
};

use super::messages::{MatchMessage, MatchSummary};
use crate::{
    game::entities::{JoinMetadata, MatchId, MatchState, Presence, UserId},
    gateway::{Outbound, SubscriberGateway},
    net::messages::decode_client_message,
    registry::RegistryError,
    session::{self, JoinDecision, MatchInit, MatchSession, PendingMove, TickError, TickReport},
};

/// Match actor handle for sending messages
#[derive(Clone, Debug)]
pub struct MatchHandle {
    match_id: MatchId,
    label: String,
    sender: mpsc::Sender<MatchMessage>,
    summary: watch::Receiver<MatchSummary>,
}

impl MatchHandle {
    pub fn new(sender: mpsc::Sender<MatchMessage>, summary: watch::Receiver<MatchSummary>) -> Self {
        let (match_id, label) = {
            let current = summary.borrow();
            (current.match_id.clone(), current.label.clone())
        };
        Self {
            match_id,
            label,
            sender,
            summary,
        }
    }

    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Latest summary published by the actor.
    pub fn summary(&self) -> MatchSummary {
        self.summary.borrow().clone()
    }

    /// The actor has stopped and will not accept messages.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Send a message to the match
    pub async fn send(&self, message: MatchMessage) -> Result<(), RegistryError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| RegistryError::HostUnavailable(self.match_id.clone()))
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> MatchMessage,
    ) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.send(message(tx)).await?;
        rx.await
            .map_err(|_| RegistryError::HostUnavailable(self.match_id.clone()))
    }

    pub async fn join(
        &self,
        presence: Presence,
        metadata: JoinMetadata,
    ) -> Result<JoinDecision, RegistryError> {
        self.request(|response| MatchMessage::Join {
            presence,
            metadata,
            response,
        })
        .await
    }

    pub async fn leave(&self, user_id: UserId) -> Result<bool, RegistryError> {
        self.request(|response| MatchMessage::Leave { user_id, response })
            .await
    }

    /// Queue a raw client message for the next tick.
    pub async fn submit(
        &self,
        user_id: UserId,
        op_code: i64,
        data: Vec<u8>,
    ) -> Result<(), RegistryError> {
        self.send(MatchMessage::Data {
            user_id,
            op_code,
            data,
        })
        .await
    }

    pub async fn signal(&self, data: String) -> Result<String, RegistryError> {
        self.request(|response| MatchMessage::Signal { data, response })
            .await
    }

    pub async fn snapshot(&self) -> Result<MatchState, RegistryError> {
        self.request(|response| MatchMessage::Snapshot { response })
            .await
    }

    /// Run a tick right away and return its report.
    pub async fn tick(&self) -> Result<TickReport, RegistryError> {
        self.request(|response| MatchMessage::Tick { response })
            .await
    }

    /// Route this match's broadcasts for `user_id` to `sender`.
    ///
    /// Returns `false` without subscribing when the user already holds a
    /// seat or a live subscription, so a second connection cannot take
    /// over the first one's channel.
    pub async fn subscribe(
        &self,
        user_id: UserId,
        sender: mpsc::Sender<Outbound>,
    ) -> Result<bool, RegistryError> {
        self.request(|response| MatchMessage::Subscribe {
            user_id,
            sender,
            response,
        })
        .await
    }

    pub async fn unsubscribe(&self, user_id: UserId) -> Result<(), RegistryError> {
        self.send(MatchMessage::Unsubscribe { user_id }).await
    }

    pub async fn terminate(&self, grace: Duration) -> Result<MatchState, RegistryError> {
        self.request(|response| MatchMessage::Terminate { grace, response })
            .await
    }
}

/// Actor owning a single match session
pub struct MatchActor {
    session: MatchSession,

    /// Subscribers receiving broadcasts
    gateway: SubscriberGateway,

    /// Message inbox
    inbox: mpsc::Receiver<MatchMessage>,

    /// Moves received since the last tick, in delivery order
    pending: Vec<PendingMove>,

    /// Seated and attempting presences by user id
    presences: HashMap<UserId, Presence>,

    summary: watch::Sender<MatchSummary>,

    tick_rate_hz: u32,

    stopped: bool,
}

impl MatchActor {
    /// Wrap an initialized session.
    ///
    /// # Returns
    ///
    /// * `(MatchActor, MatchHandle)` - Actor and handle for sending messages
    pub fn new(init: MatchInit) -> (Self, MatchHandle) {
        let MatchInit {
            session,
            tick_rate_hz,
            ..
        } = init;
        let (sender, inbox) = mpsc::channel(session.config().inbox_capacity);
        let (summary, summary_rx) = watch::channel(MatchSummary::new(session.state()));

        let actor = Self {
            session,
            gateway: SubscriberGateway::new(),
            inbox,
            pending: Vec::new(),
            presences: HashMap::new(),
            summary,
            tick_rate_hz,
            stopped: false,
        };

        (actor, MatchHandle::new(sender, summary_rx))
    }

    /// Run the match actor event loop
    pub async fn run(mut self) {
        let match_id = self.session.match_id().clone();
        log::info!("Match {match_id} running at {} Hz", self.tick_rate_hz);

        let mut ticker = interval(Duration::from_secs(1) / self.tick_rate_hz.max(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = self.inbox.recv() => {
                    let Some(message) = message else {
                        log::debug!("Match {match_id}: all handles dropped");
                        break;
                    };
                    self.handle_message(message);

                    if self.stopped {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }

        log::info!("Match {match_id} stopped");
    }

    fn handle_message(&mut self, message: MatchMessage) {
        match message {
            MatchMessage::Join {
                presence,
                metadata,
                response,
            } => {
                let decision = self.handle_join(presence, metadata);
                let _ = response.send(decision);
            }

            MatchMessage::Leave { user_id, response } => {
                let had_seat = self.handle_leave(&user_id);
                let _ = response.send(had_seat);
            }

            MatchMessage::Data {
                user_id,
                op_code,
                data,
            } => self.handle_data(user_id, op_code, &data),

            MatchMessage::Signal { data, response } => {
                let ack = self.session.signal(&mut self.gateway, &data);
                self.publish_summary(None);
                let _ = response.send(ack);
            }

            MatchMessage::Snapshot { response } => {
                let _ = response.send(self.session.state().clone());
            }

            MatchMessage::Tick { response } => {
                let report = self.tick();
                let _ = response.send(report);
            }

            MatchMessage::Subscribe {
                user_id,
                sender,
                response,
            } => {
                let subscribed = !self.session.state().is_seated(&user_id)
                    && self.gateway.subscribe(user_id, sender);
                let _ = response.send(subscribed);
            }

            MatchMessage::Unsubscribe { user_id } => {
                self.gateway.unsubscribe(&user_id);
            }

            MatchMessage::Terminate { grace, response } => {
                if !self.pending.is_empty() {
                    log::debug!(
                        "Match {}: discarding {} queued move(s) on terminate",
                        self.session.match_id(),
                        self.pending.len()
                    );
                    self.pending.clear();
                }
                let state = self.session.terminate(grace);
                self.stopped = true;
                let _ = response.send(state);
            }
        }
    }

    fn handle_join(&mut self, presence: Presence, metadata: JoinMetadata) -> JoinDecision {
        let decision = self.session.join_attempt(&presence, metadata);
        if let JoinDecision::Reject(ref reason) = decision {
            log::debug!(
                "Match {}: join by {} rejected: {reason}",
                self.session.match_id(),
                presence.user_id
            );
            return decision;
        }

        if let Err(e) = self
            .session
            .join(&mut self.gateway, std::slice::from_ref(&presence))
        {
            log::warn!(
                "Match {}: broadcast after join failed: {e}",
                self.session.match_id()
            );
        }
        self.presences.insert(presence.user_id.clone(), presence);
        self.publish_summary(None);
        decision
    }

    fn handle_leave(&mut self, user_id: &UserId) -> bool {
        let Some(presence) = self.presences.remove(user_id) else {
            return false;
        };

        if let Err(e) = self
            .session
            .leave(&mut self.gateway, std::slice::from_ref(&presence))
        {
            log::warn!(
                "Match {}: broadcast after leave failed: {e}",
                self.session.match_id()
            );
        }
        self.publish_summary(None);
        true
    }

    fn handle_data(&mut self, user_id: UserId, op_code: i64, data: &[u8]) {
        match decode_client_message(op_code, data) {
            Ok(mv) => self.pending.push(PendingMove {
                user_id,
                row: mv.row,
                col: mv.col,
            }),
            Err(e) => {
                log::debug!(
                    "Match {}: dropping message from {user_id}: {e}",
                    self.session.match_id()
                );
                if self.session.config().notify_rejections
                    && let Err(e) =
                        session::notify_malformed(&mut self.gateway, &user_id, &e.to_string())
                {
                    log::debug!(
                        "Match {}: rejection notice not delivered: {e}",
                        self.session.match_id()
                    );
                }
            }
        }
    }

    fn tick(&mut self) -> TickReport {
        if self.pending.is_empty() {
            return TickReport::default();
        }

        let moves = std::mem::take(&mut self.pending);
        let report = match self.session.tick(&mut self.gateway, moves) {
            Ok(report) => report,
            Err(TickError { report, source }) => {
                log::warn!(
                    "Match {}: broadcast after tick failed: {source}",
                    self.session.match_id()
                );
                report
            }
        };
        self.publish_summary(Some(&report));
        report
    }

    fn publish_summary(&self, report: Option<&TickReport>) {
        let state = self.session.state();
        self.summary.send_modify(|summary| {
            summary.refresh(state);
            if let Some(report) = report {
                summary.moves_accepted += report.accepted as u64;
                summary.moves_rejected += report.rejected.len() as u64;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        game::entities::Phase, net::messages::OpCode, session::MatchConfig,
    };

    fn spawn_match() -> MatchHandle {
        let init = MatchSession::init(MatchId::from("actor-test"), MatchConfig::default()).unwrap();
        let (actor, handle) = MatchActor::new(init);
        tokio::spawn(actor.run());
        handle
    }

    #[tokio::test]
    async fn test_join_updates_summary() {
        let handle = spawn_match();
        let decision = handle
            .join(Presence::new("alice", "alice"), JoinMetadata::default())
            .await
            .unwrap();
        assert!(decision.is_accepted());

        let summary = handle.summary();
        assert_eq!(summary.seat_count, 1);
        assert!(summary.is_joinable());
    }

    #[tokio::test]
    async fn test_queued_moves_apply_on_tick() {
        let handle = spawn_match();
        let (tx, mut rx) = mpsc::channel(8);
        assert!(handle.subscribe(UserId::new("alice"), tx).await.unwrap());
        handle
            .join(Presence::new("alice", "alice"), JoinMetadata::default())
            .await
            .unwrap();
        handle
            .join(Presence::new("bob", "bob"), JoinMetadata::default())
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().op_code, OpCode::MatchStarted);

        handle
            .submit(UserId::new("alice"), 4, b"1,1".to_vec())
            .await
            .unwrap();
        let report = handle.tick().await.unwrap();
        // The interval may already have drained the queue.
        assert!(report.accepted <= 1);

        let state = handle.snapshot().await.unwrap();
        assert_eq!(state.phase, Phase::InProgress);
        assert_eq!(state.board.get(1, 1), Some(crate::game::entities::Cell::X));
        assert_eq!(rx.recv().await.unwrap().op_code, OpCode::MoveApplied);
        assert_eq!(handle.summary().moves_accepted, 1);
    }

    #[tokio::test]
    async fn test_malformed_data_sends_private_notice() {
        let handle = spawn_match();
        let (tx, mut rx) = mpsc::channel(8);
        assert!(handle.subscribe(UserId::new("alice"), tx).await.unwrap());
        handle
            .submit(UserId::new("alice"), 4, b"garbage".to_vec())
            .await
            .unwrap();

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.op_code, OpCode::MoveRejected);
    }

    #[tokio::test]
    async fn test_second_subscription_for_same_user_is_refused() {
        let handle = spawn_match();
        let (first_tx, mut first_rx) = mpsc::channel(8);
        assert!(handle.subscribe(UserId::new("alice"), first_tx).await.unwrap());

        let (second_tx, mut second_rx) = mpsc::channel(8);
        assert!(!handle.subscribe(UserId::new("alice"), second_tx).await.unwrap());

        // The first channel keeps receiving; the refused one is dropped.
        handle
            .submit(UserId::new("alice"), 4, b"garbage".to_vec())
            .await
            .unwrap();
        assert_eq!(first_rx.recv().await.unwrap().op_code, OpCode::MoveRejected);
        assert!(second_rx.recv().await.is_none());

        // A seated user is refused even without a subscription.
        handle
            .join(Presence::new("alice", "alice"), JoinMetadata::default())
            .await
            .unwrap();
        handle.unsubscribe(UserId::new("alice")).await.unwrap();
        let (third_tx, _third_rx) = mpsc::channel(8);
        assert!(!handle.subscribe(UserId::new("alice"), third_tx).await.unwrap());
        assert_eq!(handle.snapshot().await.unwrap().seats.len(), 1);
    }

    #[tokio::test]
    async fn test_summary_counts_moves_when_a_subscriber_is_full() {
        let handle = spawn_match();
        let (alice_tx, mut alice_rx) = mpsc::channel(8);
        let (bob_tx, _bob_rx) = mpsc::channel(1);
        assert!(handle.subscribe(UserId::new("alice"), alice_tx).await.unwrap());
        assert!(handle.subscribe(UserId::new("bob"), bob_tx).await.unwrap());
        for user in ["alice", "bob"] {
            handle
                .join(Presence::new(user, user), JoinMetadata::default())
                .await
                .unwrap();
        }
        assert_eq!(alice_rx.recv().await.unwrap().op_code, OpCode::MatchStarted);

        // Bob never drains MatchStarted, so the MoveApplied broadcast fails.
        handle
            .submit(UserId::new("alice"), 4, b"1,1".to_vec())
            .await
            .unwrap();
        handle.tick().await.unwrap();

        assert_eq!(alice_rx.recv().await.unwrap().op_code, OpCode::MoveApplied);
        handle.snapshot().await.unwrap();
        assert_eq!(handle.summary().moves_accepted, 1);
    }

    #[tokio::test]
    async fn test_leave_without_seat_reports_false() {
        let handle = spawn_match();
        assert!(!handle.leave(UserId::new("nobody")).await.unwrap());
    }

    #[tokio::test]
    async fn test_terminate_stops_actor() {
        let handle = spawn_match();
        let state = handle.terminate(Duration::from_secs(1)).await.unwrap();
        assert_eq!(state.phase, Phase::WaitingForPlayers);

        assert!(matches!(
            handle.snapshot().await,
            Err(RegistryError::HostUnavailable(_))
        ));
        assert!(handle.is_closed());
    }
}
