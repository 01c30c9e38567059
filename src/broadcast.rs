use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::registry::{ClientId, Registry};

/// Fans one chat line out to every registered participant except the origin.
///
/// The membership snapshot is taken once, then delivery runs outside the
/// registry lock. A recipient whose send buffer is full has stopped draining
/// its socket; it is disconnected on the spot rather than allowed to stall
/// everyone behind it. Either failure mode is isolated to that one
/// recipient, so this function itself cannot fail.
pub async fn deliver(registry: &Registry, origin: ClientId, text: &str) {
    let recipients = registry.snapshot_excluding(origin).await;

    for (id, handle) in recipients {
        match handle.try_deliver(text.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(client = id, name = %handle.name, "send buffer full, disconnecting slow peer");
                registry.remove(id).await;
            }
            Err(TrySendError::Closed(_)) => {
                // The session is already tearing down; drop our stale entry.
                debug!(client = id, name = %handle.name, "recipient gone before delivery");
                registry.remove(id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn origin_is_excluded_and_others_receive_once() {
        let registry = Registry::new();
        let (alice_tx, mut alice_rx) = mpsc::channel(8);
        let (bob_tx, mut bob_rx) = mpsc::channel(8);
        registry.add(1, "alice".into(), alice_tx).await;
        registry.add(2, "bob".into(), bob_tx).await;

        deliver(&registry, 1, "hello").await;

        assert_eq!(bob_rx.recv().await, Some("hello".to_string()));
        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_recipient_is_dropped_without_failing_others() {
        let registry = Registry::new();
        let (stuck_tx, _stuck_rx) = mpsc::channel(1);
        stuck_tx.try_send("backlog".to_string()).expect("fill buffer");
        let (bob_tx, mut bob_rx) = mpsc::channel(8);
        registry.add(1, "stuck".into(), stuck_tx).await;
        registry.add(2, "bob".into(), bob_tx).await;

        deliver(&registry, 3, "ping").await;

        assert_eq!(bob_rx.recv().await, Some("ping".to_string()));
        assert_eq!(registry.len().await, 1);
        assert!(registry.remove(1).await.is_none());
    }

    #[tokio::test]
    async fn departed_recipient_is_purged() {
        let registry = Registry::new();
        let (gone_tx, gone_rx) = mpsc::channel::<String>(8);
        drop(gone_rx);
        registry.add(1, "gone".into(), gone_tx).await;

        deliver(&registry, 2, "anyone there?").await;

        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn per_origin_order_is_preserved() {
        let registry = Registry::new();
        let (bob_tx, mut bob_rx) = mpsc::channel(8);
        registry.add(2, "bob".into(), bob_tx).await;

        deliver(&registry, 1, "first").await;
        deliver(&registry, 1, "second").await;

        assert_eq!(bob_rx.recv().await, Some("first".to_string()));
        assert_eq!(bob_rx.recv().await, Some("second".to_string()));
    }
}
