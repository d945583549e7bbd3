//! # Tic-Tac-Toe
//!
//! An authoritative, server-side match engine for two-player tic-tac-toe,
//! plus the registry used to pair players into matches.
//!
//! ## Architecture
//!
//! A match moves strictly forward through three phases:
//!
//! - **WaitingForPlayers**: zero or one seat taken
//! - **InProgress**: both seats taken, players alternate moves
//! - **Finished**: a line of three, a full board, or a player left
//!
//! Each match is owned by exactly one [`session::MatchSession`], driven by
//! a host that invokes it for one event at a time. State changes are
//! pushed to participants as full snapshots through a
//! [`gateway::BroadcastGateway`] using a fixed set of opcodes.
//!
//! ## Core Modules
//!
//! - [`game`]: board, seats, move validation and win detection
//! - [`session`]: per-match state machine
//! - [`gateway`]: outbound broadcast seam
//! - [`host`]: one Tokio actor per match, ticking at the configured rate
//! - [`registry`]: find-or-create matchmaking and match lifecycle
//! - [`net`]: opcodes and payload codecs
//!
//! ## Example
//!
//! ```
//! use tictactoe::game::entities::{JoinMetadata, MatchId, Presence};
//! use tictactoe::gateway::RecordingGateway;
//! use tictactoe::session::{MatchConfig, MatchSession, PendingMove};
//!
//! let mut session = MatchSession::init(MatchId::generate(), MatchConfig::default())
//!     .unwrap()
//!     .session;
//! let mut gateway = RecordingGateway::new();
//!
//! let players = [Presence::new("alice", "alice"), Presence::new("bob", "bob")];
//! for p in &players {
//!     assert!(session.join_attempt(p, JoinMetadata::default()).is_accepted());
//! }
//! session.join(&mut gateway, &players).unwrap();
//!
//! let report = session
//!     .tick(&mut gateway, vec![PendingMove::new("alice", 1, 1)])
//!     .unwrap();
//! assert_eq!(report.accepted, 1);
//! ```

/// Opcodes and payload codecs.
pub mod net;
pub use net::messages;

/// Board, seats and rules.
pub mod game;
pub use game::{
    MoveError, Outcome,
    constants::{self, BOARD_SIZE, MAX_SEATS},
    entities,
};

pub mod gateway;
pub mod host;
pub mod registry;
pub mod session;

pub use gateway::{BroadcastGateway, GatewayError, SubscriberGateway};
pub use host::{ActorFactory, MatchFactory, MatchHandle, MatchSummary};
pub use registry::{MatchRegistry, RegistryError};
pub use session::{JoinDecision, MatchConfig, MatchSession};
