// ABOUTME: In-memory registry of the single active workflow unit per entity.
// ABOUTME: Registration is atomic; a unit deregisters itself when its ticket drops.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

use crate::types::Id;

struct Entry {
    generation: u64,
    cancel: CancellationToken,
    done: CancellationToken,
}

struct Inner<M> {
    tasks: Mutex<HashMap<Id<M>, Entry>>,
    next_generation: AtomicU64,
}

/// Maps an entity id to its running workflow unit.
///
/// "Is a workflow already running for X" is answered and claimed in one
/// locked step by [`TaskRegistry::try_register`].
pub struct TaskRegistry<M> {
    inner: Arc<Inner<M>>,
}

impl<M> Clone for TaskRegistry<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> Default for TaskRegistry<M> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }
}

impl<M> std::fmt::Debug for TaskRegistry<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("running", &self.inner.tasks.lock().len())
            .finish()
    }
}

impl<M> TaskRegistry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`. Returns `None` when another unit already holds it.
    pub fn try_register(&self, id: &Id<M>) -> Option<TaskTicket<M>> {
        let mut tasks = self.inner.tasks.lock();
        if tasks.contains_key(id) {
            return None;
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        tasks.insert(
            id.clone(),
            Entry {
                generation,
                cancel: cancel.clone(),
                done: done.clone(),
            },
        );

        Some(TaskTicket {
            id: id.clone(),
            generation,
            cancel,
            done,
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn is_running(&self, id: &Id<M>) -> bool {
        self.inner.tasks.lock().contains_key(id)
    }

    pub fn running(&self) -> Vec<Id<M>> {
        self.inner.tasks.lock().keys().cloned().collect()
    }

    /// Signal cancellation without waiting. Returns false when nothing is running.
    pub fn cancel(&self, id: &Id<M>) -> bool {
        match self.inner.tasks.lock().get(id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel the unit for `id` and wait until it has persisted its final
    /// state and deregistered. Returns false when nothing was running.
    pub async fn cancel_and_wait(&self, id: &Id<M>) -> bool {
        let done = {
            let tasks = self.inner.tasks.lock();
            match tasks.get(id) {
                Some(entry) => {
                    entry.cancel.cancel();
                    entry.done.clone()
                }
                None => return false,
            }
        };
        done.cancelled().await;
        true
    }
}

/// Proof of registration held by a running unit.
///
/// Dropping the ticket (or calling [`TaskTicket::complete`]) removes the
/// registry entry and wakes anyone waiting in `cancel_and_wait`.
pub struct TaskTicket<M> {
    id: Id<M>,
    generation: u64,
    cancel: CancellationToken,
    done: CancellationToken,
    inner: Arc<Inner<M>>,
}

impl<M> TaskTicket<M> {
    pub fn id(&self) -> &Id<M> {
        &self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn complete(self) {}
}

impl<M> Drop for TaskTicket<M> {
    fn drop(&mut self) {
        {
            let mut tasks = self.inner.tasks.lock();
            if tasks
                .get(&self.id)
                .is_some_and(|entry| entry.generation == self.generation)
            {
                tasks.remove(&self.id);
            }
        }
        self.done.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ServerId, ServerMarker};
    use std::time::Duration;

    #[test]
    fn second_registration_is_rejected() {
        let registry = TaskRegistry::<ServerMarker>::new();
        let id = ServerId::new("s1");

        let ticket = registry.try_register(&id).expect("first registration");
        assert!(registry.try_register(&id).is_none());
        assert!(registry.is_running(&id));

        ticket.complete();
        assert!(!registry.is_running(&id));
        assert!(registry.try_register(&id).is_some());
    }

    #[test]
    fn different_ids_register_independently() {
        let registry = TaskRegistry::<ServerMarker>::new();
        let _a = registry.try_register(&ServerId::new("a")).unwrap();
        let _b = registry.try_register(&ServerId::new("b")).unwrap();
        assert_eq!(registry.running().len(), 2);
    }

    #[test]
    fn cancel_reaches_ticket_token() {
        let registry = TaskRegistry::<ServerMarker>::new();
        let id = ServerId::new("s1");
        let ticket = registry.try_register(&id).unwrap();

        assert!(registry.cancel(&id));
        assert!(ticket.token().is_cancelled());
        assert!(!registry.cancel(&ServerId::new("other")));
    }

    #[tokio::test]
    async fn cancel_and_wait_returns_after_ticket_drops() {
        let registry = TaskRegistry::<ServerMarker>::new();
        let id = ServerId::new("s1");
        let ticket = registry.try_register(&id).unwrap();

        let unit = tokio::spawn(async move {
            ticket.token().cancelled().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
            ticket.complete();
        });

        assert!(registry.cancel_and_wait(&id).await);
        assert!(!registry.is_running(&id));
        unit.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_and_wait_without_unit_is_immediate() {
        let registry = TaskRegistry::<ServerMarker>::new();
        assert!(!registry.cancel_and_wait(&ServerId::new("none")).await);
    }
}
