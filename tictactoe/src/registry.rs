//! Match registry for matchmaking and match lifecycle.
//!
//! The registry is the only state shared between matches. Every lookup,
//! insertion and removal goes through a single async mutex, and
//! [`MatchRegistry::find_or_create`] holds it across the whole
//! check-then-create sequence so concurrent requests never produce two
//! open matches.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    game::entities::{MatchId, MatchState, Phase, UserId},
    host::{ActorFactory, MatchFactory, MatchHandle, MatchParams, MatchSummary},
    session::MatchConfig,
};

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The match factory failed
    #[error("Failed to create match: {0}")]
    Create(String),

    /// The match's host task is gone
    #[error("Match {0} is no longer running")]
    HostUnavailable(MatchId),
}

/// Table of live matches keyed by id.
pub struct MatchRegistry {
    matches: Mutex<HashMap<MatchId, MatchHandle>>,
    factory: Arc<dyn MatchFactory>,
}

impl MatchRegistry {
    pub fn new(factory: Arc<dyn MatchFactory>) -> Self {
        Self {
            matches: Mutex::new(HashMap::new()),
            factory,
        }
    }

    /// Registry that spawns actor-hosted matches with `config`.
    pub fn with_config(config: MatchConfig) -> Self {
        Self::new(Arc::new(ActorFactory::new(config)))
    }

    /// Returns the oldest match still waiting for players, creating one
    /// when there is none.
    pub async fn find_or_create(&self, requester: &UserId) -> Result<MatchId, RegistryError> {
        let mut matches = self.matches.lock().await;

        let open = matches
            .values()
            .filter(|handle| !handle.is_closed())
            .map(MatchHandle::summary)
            .filter(MatchSummary::is_joinable)
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.match_id.cmp(&b.match_id))
            });

        if let Some(summary) = open {
            log::debug!("Matched {requester} into open match {}", summary.match_id);
            return Ok(summary.match_id);
        }

        let params = MatchParams::new(MatchId::generate(), requester.clone());
        let handle = self.factory.create(&params)?;
        let match_id = handle.match_id().clone();
        matches.insert(match_id.clone(), handle);

        log::info!(
            "Created match {match_id} for {requester} ({} active)",
            matches.len()
        );
        Ok(match_id)
    }

    pub async fn get(&self, match_id: &MatchId) -> Option<MatchHandle> {
        self.matches.lock().await.get(match_id).cloned()
    }

    /// Drops the registry entry. A no-op when the id is unknown.
    pub async fn remove(&self, match_id: &MatchId) -> Option<MatchHandle> {
        let removed = self.matches.lock().await.remove(match_id);
        if removed.is_some() {
            log::debug!("Removed match {match_id}");
        }
        removed
    }

    /// Stops the match and removes it, returning its final state.
    ///
    /// Returns `Ok(None)` when the id is unknown, so repeated calls are
    /// harmless.
    pub async fn terminate(
        &self,
        match_id: &MatchId,
        grace: Duration,
    ) -> Result<Option<MatchState>, RegistryError> {
        let Some(handle) = self.remove(match_id).await else {
            return Ok(None);
        };

        let state = handle.terminate(grace).await?;
        log::info!("Terminated match {match_id} in {}", state.phase);
        Ok(Some(state))
    }

    /// Summaries of every registered match, oldest first.
    pub async fn list(&self) -> Vec<MatchSummary> {
        let mut summaries: Vec<MatchSummary> = self
            .matches
            .lock()
            .await
            .values()
            .map(MatchHandle::summary)
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    pub async fn len(&self) -> usize {
        self.matches.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.matches.lock().await.is_empty()
    }

    /// Terminates and removes finished matches, stopped hosts, and empty
    /// matches idle for longer than `idle_timeout`.
    ///
    /// Returns the ids that were reaped.
    pub async fn reap(&self, idle_timeout: Duration) -> Vec<MatchId> {
        let reaped: Vec<(MatchId, MatchHandle)> = {
            let mut matches = self.matches.lock().await;
            let ids: Vec<MatchId> = matches
                .iter()
                .filter(|(_, handle)| should_reap(handle, idle_timeout))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| matches.remove(&id).map(|handle| (id, handle)))
                .collect()
        };

        for (match_id, handle) in &reaped {
            if handle.is_closed() {
                log::warn!("Reaped match {match_id}: host stopped");
                continue;
            }
            match handle.terminate(Duration::ZERO).await {
                Ok(state) => log::info!("Reaped match {match_id} in {}", state.phase),
                Err(e) => log::warn!("Reaped match {match_id}: {e}"),
            }
        }

        reaped.into_iter().map(|(id, _)| id).collect()
    }

    /// Runs [`MatchRegistry::reap`] every `every` until the registry is
    /// dropped.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        every: Duration,
        idle_timeout: Duration,
    ) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    log::debug!("Match registry dropped, stopping reaper");
                    break;
                };
                let reaped = registry.reap(idle_timeout).await;
                if !reaped.is_empty() {
                    log::info!("Reaper removed {} match(es)", reaped.len());
                }
            }
        })
    }
}

fn should_reap(handle: &MatchHandle, idle_timeout: Duration) -> bool {
    if handle.is_closed() {
        return true;
    }

    let summary = handle.summary();
    match summary.phase {
        Phase::Finished => true,
        Phase::WaitingForPlayers => {
            summary.seat_count == 0 && summary.idle_for() > idle_timeout
        }
        Phase::InProgress => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::{JoinMetadata, Presence};

    struct FailingFactory;

    impl MatchFactory for FailingFactory {
        fn create(&self, _params: &MatchParams) -> Result<MatchHandle, RegistryError> {
            Err(RegistryError::Create("no capacity".to_string()))
        }
    }

    #[tokio::test]
    async fn test_factory_failure_inserts_nothing() {
        let registry = MatchRegistry::new(Arc::new(FailingFactory));
        let err = registry
            .find_or_create(&UserId::new("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Create(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_find_or_create_reuses_open_match() {
        let registry = MatchRegistry::with_config(MatchConfig::default());
        let first = registry.find_or_create(&UserId::new("alice")).await.unwrap();
        let second = registry.find_or_create(&UserId::new("bob")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_full_match_is_not_offered() {
        let registry = MatchRegistry::with_config(MatchConfig::default());
        let id = registry.find_or_create(&UserId::new("alice")).await.unwrap();
        let handle = registry.get(&id).await.unwrap();
        for user in ["alice", "bob"] {
            handle
                .join(Presence::new(user, user), JoinMetadata::default())
                .await
                .unwrap();
        }

        let next = registry.find_or_create(&UserId::new("carol")).await.unwrap();
        assert_ne!(id, next);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let registry = MatchRegistry::with_config(MatchConfig::default());
        assert!(registry.remove(&MatchId::from("missing")).await.is_none());
        let id = registry.find_or_create(&UserId::new("alice")).await.unwrap();
        assert!(registry.remove(&id).await.is_some());
        assert!(registry.remove(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_terminate_twice() {
        let registry = MatchRegistry::with_config(MatchConfig::default());
        let id = registry.find_or_create(&UserId::new("alice")).await.unwrap();

        let state = registry.terminate(&id, Duration::ZERO).await.unwrap();
        assert_eq!(state.unwrap().match_id, id);
        assert!(registry.terminate(&id, Duration::ZERO).await.unwrap().is_none());
        assert!(registry.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_reap_removes_idle_empty_matches_only() {
        let registry = MatchRegistry::with_config(MatchConfig::default());
        let idle = registry.find_or_create(&UserId::new("alice")).await.unwrap();
        let handle = registry.get(&idle).await.unwrap();
        handle.terminate(Duration::ZERO).await.unwrap();
        while !handle.is_closed() {
            tokio::task::yield_now().await;
        }

        // Stopped host is reaped regardless of timeout.
        let reaped = registry.reap(Duration::from_secs(3600)).await;
        assert_eq!(reaped, vec![idle]);

        let waiting = registry.find_or_create(&UserId::new("bob")).await.unwrap();
        assert!(registry.reap(Duration::from_secs(3600)).await.is_empty());
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(registry.reap(Duration::ZERO).await, vec![waiting]);
    }
}
