use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use tokio::sync::{Mutex, mpsc};

pub type ClientId = u64;

/// Non-owning view of one connected participant: the display name plus the
/// sink feeding that participant's writer. The session owns the socket; the
/// registry only ever holds this handle.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub name: String,
    outbound: mpsc::Sender<String>,
}

impl ClientHandle {
    /// Queues one line for this participant without blocking. Fails when the
    /// participant's send buffer is full or its session has already gone.
    pub fn try_deliver(&self, text: String) -> Result<(), mpsc::error::TrySendError<String>> {
        self.outbound.try_send(text)
    }
}

/// The single shared source of truth for who is currently connected.
///
/// All mutation happens under one mutex, so a broadcast snapshot observes
/// membership atomically: a completed `add` is always visible, a completed
/// `remove` never is. Delivery happens outside the lock, against the
/// snapshot.
pub struct Registry {
    clients: Mutex<HashMap<ClientId, ClientHandle>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Hands out a fresh id for a just-accepted connection.
    pub fn next_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Inserts a newly registered participant. Ids come from [`next_id`],
    /// so a collision is a programming error, not a runtime condition.
    ///
    /// [`next_id`]: Registry::next_id
    pub async fn add(&self, id: ClientId, name: String, outbound: mpsc::Sender<String>) {
        let mut clients = self.clients.lock().await;
        let previous = clients.insert(id, ClientHandle { name, outbound });
        assert!(previous.is_none(), "client id {id} registered twice");
    }

    /// Removes a participant. Idempotent, so the slow-peer disconnect path
    /// and the session's own cleanup can race without harm. Dropping the
    /// stored handle closes the participant's outbound queue, which is what
    /// wakes its session to shut down.
    pub async fn remove(&self, id: ClientId) -> Option<ClientHandle> {
        let mut clients = self.clients.lock().await;
        clients.remove(&id)
    }

    /// Copy-then-iterate membership snapshot for broadcast fan-out,
    /// excluding the originating participant.
    pub async fn snapshot_excluding(&self, id: ClientId) -> Vec<(ClientId, ClientHandle)> {
        let clients = self.clients.lock().await;
        clients
            .iter()
            .filter(|(other, _)| **other != id)
            .map(|(other, handle)| (*other, handle.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        let clients = self.clients.lock().await;
        clients.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::*;

    fn sink() -> mpsc::Sender<String> {
        let (tx, _rx) = mpsc::channel(8);
        tx
    }

    #[tokio::test]
    async fn snapshot_excludes_the_origin() {
        let registry = Registry::new();
        registry.add(1, "alice".into(), sink()).await;
        registry.add(2, "bob".into(), sink()).await;
        registry.add(3, "carol".into(), sink()).await;

        let snapshot = registry.snapshot_excluding(2).await;
        let ids: HashSet<ClientId> = snapshot.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, HashSet::from([1, 3]));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = Registry::new();
        registry.add(1, "alice".into(), sink()).await;

        let first = registry.remove(1).await;
        assert_eq!(first.map(|handle| handle.name), Some("alice".to_string()));
        assert!(registry.remove(1).await.is_none());
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    #[should_panic(expected = "registered twice")]
    async fn double_add_violates_the_contract() {
        let registry = Registry::new();
        registry.add(7, "alice".into(), sink()).await;
        registry.add(7, "imposter".into(), sink()).await;
    }

    /// Membership after an arbitrary interleaving of adds and removes must
    /// equal exactly the set of ids whose last completed operation was an
    /// add.
    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_adds_and_removes_linearize() {
        let registry = Arc::new(Registry::new());
        let mut tasks = Vec::new();

        for worker in 0u64..64 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let id = registry.next_id();
                registry.add(id, format!("client-{worker}"), sink()).await;
                // Odd workers leave again; even workers stay.
                if worker % 2 == 1 {
                    registry.remove(id).await;
                    None
                } else {
                    Some(id)
                }
            }));
        }

        let mut expected = HashSet::new();
        for task in tasks {
            if let Some(id) = task.await.expect("worker task panicked") {
                expected.insert(id);
            }
        }

        let snapshot = registry.snapshot_excluding(u64::MAX).await;
        let actual: HashSet<ClientId> = snapshot.iter().map(|(id, _)| *id).collect();
        assert_eq!(actual, expected);
        assert_eq!(registry.len().await, expected.len());
    }
}
