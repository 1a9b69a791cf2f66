//! Live view of a multiplayer session: push channel first, polling fallback.

use crate::client::SessionClient;
use crate::endpoints::push_url;
use crate::types::{status_label, SessionState};
use futures_util::StreamExt;
use lumo::{LumoError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

/// Which transport currently feeds the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Disconnected,
    Live,
    Polling,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub state: Option<SessionState>,
    pub error: Option<String>,
    pub transport: TransportState,
}

impl SessionView {
    pub fn connected(&self) -> bool {
        self.transport == TransportState::Live
    }

    pub fn status_label(&self) -> &'static str {
        status_label(self.state.as_ref())
    }
}

struct Running {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns at most one background task watching one session.
///
/// Idle while disabled or without a session id. Every retarget, shutdown
/// or drop closes the push channel and cancels the poll timer of the
/// previous task.
pub struct SessionWatch {
    client: Arc<SessionClient>,
    view_tx: Arc<watch::Sender<SessionView>>,
    generation: Arc<AtomicU64>,
    session_id: Option<String>,
    enabled: bool,
    running: Option<Running>,
}

impl SessionWatch {
    pub fn new(client: Arc<SessionClient>) -> Self {
        let (view_tx, _rx) = watch::channel(SessionView::default());
        Self {
            client,
            view_tx: Arc::new(view_tx),
            generation: Arc::new(AtomicU64::new(0)),
            session_id: None,
            enabled: false,
            running: None,
        }
    }

    /// Build a watcher and immediately point it at `session_id`.
    pub fn start(client: Arc<SessionClient>, session_id: Option<String>, enabled: bool) -> Self {
        let mut session_watch = Self::new(client);
        session_watch.session_id = session_id;
        session_watch.enabled = enabled;
        session_watch.spawn_if_active();
        session_watch
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view_tx.subscribe()
    }

    pub fn view(&self) -> SessionView {
        self.view_tx.borrow().clone()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.running.is_some()
    }

    /// Switch to another session (or enable/disable). The previous task is
    /// fully torn down before a new one starts. No-op if nothing changed.
    pub async fn retarget(&mut self, session_id: Option<String>, enabled: bool) {
        if session_id == self.session_id && enabled == self.enabled {
            return;
        }
        self.teardown().await;
        self.session_id = session_id;
        self.enabled = enabled;
        self.spawn_if_active();
    }

    /// Tear down the running task and wait until it has exited.
    pub async fn shutdown(mut self) {
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.view_tx.send_replace(SessionView::default());

        if let Some(running) = self.running.take() {
            let _ = running.stop.send(());
            let mut handle = running.handle;
            if tokio::time::timeout(TEARDOWN_GRACE, &mut handle).await.is_err() {
                tracing::warn!("[MP] session task did not stop in time, aborting");
                handle.abort();
            }
        }
    }

    fn spawn_if_active(&mut self) {
        let session_id = match (&self.session_id, self.enabled) {
            (Some(id), true) => id.clone(),
            _ => return,
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = SessionTask {
            client: Arc::clone(&self.client),
            session_id,
            publisher: Publisher {
                view_tx: Arc::clone(&self.view_tx),
                generation: Arc::clone(&self.generation),
                my_generation: self.generation.load(Ordering::SeqCst),
            },
        };

        let handle = tokio::spawn(task.run(stop_rx));
        self.running = Some(Running {
            stop: stop_tx,
            handle,
        });
    }
}

impl Drop for SessionWatch {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(running) = self.running.take() {
            // the task closes its socket once it sees the signal
            let _ = running.stop.send(());
        }
    }
}

/// Publishes into the shared view only while its generation is current.
struct Publisher {
    view_tx: Arc<watch::Sender<SessionView>>,
    generation: Arc<AtomicU64>,
    my_generation: u64,
}

impl Publisher {
    fn update(&self, f: impl FnOnce(&mut SessionView)) {
        self.view_tx.send_if_modified(|view| {
            if self.generation.load(Ordering::SeqCst) != self.my_generation {
                return false;
            }
            let before = view.clone();
            f(view);
            *view != before
        });
    }

    fn snapshot(&self, state: SessionState) {
        self.update(|view| {
            view.state = Some(state);
            view.error = None;
        });
    }

    fn transport(&self, transport: TransportState) {
        self.update(|view| view.transport = transport);
    }
}

enum ChannelEnd {
    Stopped,
    Lost(String),
}

type PushStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct SessionTask {
    client: Arc<SessionClient>,
    session_id: String,
    publisher: Publisher,
}

impl SessionTask {
    async fn run(self, mut stop: oneshot::Receiver<()>) {
        tracing::debug!("[MP {}] watching session", self.session_id);

        // not connected yet, so the poll timer runs while the handshake is pending
        self.publisher.transport(TransportState::Polling);
        let mut ticker = self.poll_ticker();

        let initial = self.fetch_once();
        let connect = self.connect();
        tokio::pin!(initial, connect);
        let mut initial_done = false;

        let connected = loop {
            tokio::select! {
                _ = &mut stop => return,
                _ = &mut initial, if !initial_done => initial_done = true,
                conn = &mut connect => break conn,
                _ = ticker.tick(), if initial_done => {
                    tokio::select! {
                        _ = &mut stop => return,
                        conn = &mut connect => break conn,
                        _ = self.fetch_once() => {}
                    }
                }
            }
        };

        // channel snapshots are only applied after the first fetch settles
        if !initial_done {
            tokio::select! {
                _ = &mut stop => return,
                _ = &mut initial => {}
            }
        }

        match connected {
            Ok(ws) => {
                tracing::info!("[MP {}] push channel open", self.session_id);
                self.publisher.transport(TransportState::Live);
                match self.stream(ws, &mut stop).await {
                    ChannelEnd::Stopped => return,
                    ChannelEnd::Lost(reason) => {
                        tracing::warn!(
                            "[MP {}] push channel lost, polling instead: {}",
                            self.session_id,
                            reason
                        );
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    "[MP {}] push channel unavailable, polling instead: {}",
                    self.session_id,
                    e
                );
            }
        }

        self.poll(&mut stop).await;
        tracing::debug!("[MP {}] session task stopped", self.session_id);
    }

    /// First tick lands one interval from now.
    fn poll_ticker(&self) -> Interval {
        let period = self.client.config().poll_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    async fn fetch_once(&self) {
        match self.client.fetch_state(&self.session_id).await {
            Ok(state) => self.publisher.snapshot(state),
            Err(e) => {
                tracing::warn!("[MP {}] fetch failed: {}", self.session_id, e);
                let message = e.to_string();
                self.publisher.update(|view| view.error = Some(message));
            }
        }
    }

    async fn connect(&self) -> Result<PushStream> {
        let url = push_url(self.client.config(), &self.session_id)?;
        match tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url.as_str()))
            .await
        {
            Ok(Ok((ws, _response))) => Ok(ws),
            Ok(Err(e)) => Err(LumoError::Channel(e.to_string())),
            Err(_) => Err(LumoError::Channel("connect timed out".into())),
        }
    }

    /// Feed every inbound snapshot into the view until the channel ends.
    async fn stream(&self, mut ws: PushStream, stop: &mut oneshot::Receiver<()>) -> ChannelEnd {
        loop {
            let frame = tokio::select! {
                _ = &mut *stop => {
                    let _ = ws.close(None).await;
                    return ChannelEnd::Stopped;
                }
                frame = ws.next() => frame,
            };

            let parsed = match frame {
                Some(Ok(Message::Text(text))) => serde_json::from_str::<SessionState>(&text),
                Some(Ok(Message::Binary(bytes))) => serde_json::from_slice::<SessionState>(&bytes),
                Some(Ok(Message::Close(_))) | None => {
                    return ChannelEnd::Lost("closed by server".into())
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return ChannelEnd::Lost(e.to_string()),
            };

            match parsed {
                Ok(state) => self.publisher.snapshot(state),
                Err(e) => {
                    let _ = ws.close(None).await;
                    return ChannelEnd::Lost(format!("malformed snapshot: {}", e));
                }
            }
        }
    }

    async fn poll(&self, stop: &mut oneshot::Receiver<()>) {
        self.publisher.transport(TransportState::Polling);
        let mut ticker = self.poll_ticker();

        loop {
            tokio::select! {
                _ = &mut *stop => return,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = &mut *stop => return,
                _ = self.fetch_once() => {}
            }
        }
    }
}
