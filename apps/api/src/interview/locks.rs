//! Per-conversation concurrency control.
//!
//! Each conversation id maps to a `Semaphore(1)` per concern:
//! - turns: at most one exchange (or seeding, or ending) in flight; a second
//!   caller is rejected immediately rather than queued. Report generation
//!   waits on this slot so it never reads a half-finished exchange.
//! - reports: generation is serialized; a second caller waits, then finds the
//!   report already created.
//!
//! Permits release on drop, so a turn's permit lives exactly as long as the
//! relay task that owns it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

#[derive(Default)]
pub struct ConversationLocks {
    turns: Mutex<HashMap<Uuid, Arc<Semaphore>>>,
    reports: Mutex<HashMap<Uuid, Arc<Semaphore>>>,
}

/// A turn is already running for this conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnInProgress;

impl std::fmt::Display for TurnInProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a turn is already in progress for this interview")
    }
}

impl std::error::Error for TurnInProgress {}

fn semaphore_for(map: &Mutex<HashMap<Uuid, Arc<Semaphore>>>, id: Uuid) -> Arc<Semaphore> {
    map.lock()
        .entry(id)
        .or_insert_with(|| Arc::new(Semaphore::new(1)))
        .clone()
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the turn slot without waiting.
    pub fn try_acquire_turn(&self, interview_id: Uuid) -> Result<OwnedSemaphorePermit, TurnInProgress> {
        semaphore_for(&self.turns, interview_id)
            .try_acquire_owned()
            .map_err(|_| TurnInProgress)
    }

    /// Waits for the turn slot to free up.
    pub async fn acquire_turn(
        &self,
        interview_id: Uuid,
    ) -> Result<OwnedSemaphorePermit, AcquireError> {
        semaphore_for(&self.turns, interview_id)
            .acquire_owned()
            .await
    }

    /// Waits for the report slot.
    pub async fn acquire_report(
        &self,
        interview_id: Uuid,
    ) -> Result<OwnedSemaphorePermit, AcquireError> {
        semaphore_for(&self.reports, interview_id)
            .acquire_owned()
            .await
    }

    /// Drops entries nobody holds or waits on. A held permit or a waiter keeps
    /// its own clone of the `Arc`, so a strong count of 1 means idle.
    pub fn prune_idle(&self) {
        self.turns.lock().retain(|_, sem| Arc::strong_count(sem) > 1);
        self.reports.lock().retain(|_, sem| Arc::strong_count(sem) > 1);
    }

    /// Number of conversations with a tracked lock (for monitoring).
    pub fn tracked(&self) -> usize {
        self.turns.lock().len() + self.reports.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_second_turn_rejected_while_first_held() {
        let locks = ConversationLocks::new();
        let id = Uuid::new_v4();

        let permit = locks.try_acquire_turn(id).unwrap();
        assert_eq!(locks.try_acquire_turn(id).unwrap_err(), TurnInProgress);

        drop(permit);
        assert!(locks.try_acquire_turn(id).is_ok());
    }

    #[test]
    fn test_different_conversations_independent() {
        let locks = ConversationLocks::new();
        let _a = locks.try_acquire_turn(Uuid::new_v4()).unwrap();
        let _b = locks.try_acquire_turn(Uuid::new_v4()).unwrap();
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn test_report_waiter_proceeds_after_release() {
        let locks = Arc::new(ConversationLocks::new());
        let id = Uuid::new_v4();

        let first = locks.acquire_report(id).await.unwrap();

        let waiter_locks = locks.clone();
        let handle = tokio::spawn(async move {
            let _second = waiter_locks.acquire_report(id).await.unwrap();
            42
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        drop(first);
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_turn_waiter_proceeds_after_exchange_finishes() {
        let locks = Arc::new(ConversationLocks::new());
        let id = Uuid::new_v4();

        let exchange = locks.try_acquire_turn(id).unwrap();
        let waiter_locks = locks.clone();
        let handle = tokio::spawn(async move { waiter_locks.acquire_turn(id).await.is_ok() });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        drop(exchange);
        assert!(handle.await.unwrap());
    }

    #[test]
    fn test_prune_keeps_held_locks_only() {
        let locks = ConversationLocks::new();
        let held = Uuid::new_v4();

        let _permit = locks.try_acquire_turn(held).unwrap();
        drop(locks.try_acquire_turn(Uuid::new_v4()).unwrap());
        assert_eq!(locks.tracked(), 2);

        locks.prune_idle();
        assert_eq!(locks.tracked(), 1);
        assert!(locks.try_acquire_turn(held).is_err());
    }
}
