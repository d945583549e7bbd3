//! Reference host: one async actor per match.
//!
//! Each match runs in its own Tokio task with an mpsc inbox. The actor
//! owns its [`MatchSession`](crate::session::MatchSession) exclusively,
//! queues client moves as they arrive and applies them on a fixed-rate
//! interval. The registry creates matches through a [`MatchFactory`].
//!
//! ## Example
//!
//! ```no_run
//! use tictactoe::host::{ActorFactory, MatchFactory, MatchParams};
//! use tictactoe::game::entities::{MatchId, UserId};
//! use tictactoe::session::MatchConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let factory = ActorFactory::new(MatchConfig::default());
//!     let params = MatchParams::new(MatchId::generate(), UserId::new("alice"));
//!     let handle = factory.create(&params).unwrap();
//!     let state = handle.snapshot().await.unwrap();
//!     assert!(state.seats.is_empty());
//! }
//! ```

pub mod actor;
pub mod messages;

pub use actor::{MatchActor, MatchHandle};
pub use messages::{MatchMessage, MatchSummary};

use crate::{
    game::entities::{MatchId, UserId},
    registry::RegistryError,
    session::{MatchConfig, MatchSession},
};

/// Parameters for creating a match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchParams {
    pub match_id: MatchId,
    /// User whose matchmaking request caused the creation
    pub requester: UserId,
}

impl MatchParams {
    pub fn new(match_id: MatchId, requester: UserId) -> Self {
        Self {
            match_id,
            requester,
        }
    }
}

/// Creates and starts a match, returning a handle to it.
///
/// Called with the registry lock held, so implementations must not wait
/// on other matches.
pub trait MatchFactory: Send + Sync {
    fn create(&self, params: &MatchParams) -> Result<MatchHandle, RegistryError>;
}

/// Spawns a [`MatchActor`] on the current Tokio runtime.
#[derive(Clone, Debug, Default)]
pub struct ActorFactory {
    config: MatchConfig,
}

impl ActorFactory {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }
}

impl MatchFactory for ActorFactory {
    fn create(&self, params: &MatchParams) -> Result<MatchHandle, RegistryError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RegistryError::Create(e.to_string()))?;
        let init = MatchSession::init(params.match_id.clone(), self.config.clone())
            .map_err(|e| RegistryError::Create(e.to_string()))?;

        let (actor, handle) = MatchActor::new(init);
        runtime.spawn(actor.run());

        log::info!(
            "Spawned match {} for {}",
            params.match_id,
            params.requester
        );
        Ok(handle)
    }
}
