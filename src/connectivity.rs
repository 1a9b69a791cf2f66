use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Online/offline signal with change notifications.
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the signal; subscribers are only woken on an actual change.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(
                "[NET] connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Periodically probe `url` and feed the outcome into this signal.
    /// Any HTTP response counts as reachable; only transport failures mark us offline.
    pub fn spawn_probe(&self, url: String, interval: Duration) -> JoinHandle<()> {
        let signal = self.clone();
        let http_client = reqwest::Client::builder()
            .timeout(interval.min(Duration::from_secs(5)))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match http_client.get(&url).send().await {
                    Ok(_) => signal.set_online(true),
                    Err(e) => {
                        tracing::debug!("[NET] probe of {} failed: {}", url, e);
                        signal.set_online(false);
                    }
                }
            }
        })
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_online_notifies_on_change_only() {
        let signal = Connectivity::new(false);
        let mut rx = signal.subscribe();

        signal.set_online(false);
        assert!(!rx.has_changed().unwrap());

        signal.set_online(true);
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
        assert!(signal.is_online());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let signal = Connectivity::new(true);
        let other = signal.clone();
        other.set_online(false);
        assert!(!signal.is_online());
    }

    #[tokio::test]
    async fn test_probe_marks_unreachable_host_offline() {
        let signal = Connectivity::new(true);
        // port 9 on localhost is discard; nothing should be listening
        let handle = signal.spawn_probe(
            "http://127.0.0.1:9/health".to_string(),
            Duration::from_millis(20),
        );

        let mut rx = signal.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|online| !*online))
            .await
            .expect("probe never reported offline")
            .unwrap();

        handle.abort();
    }
}
