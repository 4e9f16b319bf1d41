use std::sync::Arc;

use tokio::sync::watch;

/// Observable online/offline state. The sync engine subscribes and fires
/// a cycle on every offline-to-online edge; anything may flip the state
/// (platform reachability callbacks, a failed remote call, tests).
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|state| {
            if *state != online {
                *state = online;
                true
            } else {
                false
            }
        });
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_edges_only() {
        let connectivity = Connectivity::new(false);
        let mut rx = connectivity.subscribe();

        // No-op set: no notification pending.
        connectivity.set_online(false);
        assert!(!rx.has_changed().expect("channel alive"));

        connectivity.set_online(true);
        assert!(rx.has_changed().expect("channel alive"));
        rx.changed().await.expect("receive edge");
        assert!(*rx.borrow_and_update());
        assert!(connectivity.is_online());
    }
}
