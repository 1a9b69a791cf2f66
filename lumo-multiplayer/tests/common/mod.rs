use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// How the fake server treats push-channel connections
#[derive(Clone, Debug)]
#[allow(dead_code)]
pub enum PushMode {
    /// Answer the upgrade with 403
    Refuse,
    /// Accept, then close right away
    CloseAfterOpen,
    /// Accept, send these text frames, then hold the socket open
    Send(Vec<String>),
    /// Accept and hold the socket open
    Hold,
    /// Accept the TCP connection but never answer the upgrade
    Stall,
}

pub struct FakeGame {
    pub snapshots: Mutex<HashMap<String, serde_json::Value>>,
    pub fail_fetch: AtomicBool,
    pub fetches: AtomicUsize,
    pub push_mode: Mutex<PushMode>,
    pub open_sockets: AtomicUsize,
    pub accepted_sockets: AtomicUsize,
    pub closed_by_client: AtomicUsize,
    pub last_push_query: Mutex<Option<HashMap<String, String>>>,
}

#[allow(dead_code)]
impl FakeGame {
    pub fn new(mode: PushMode) -> Arc<Self> {
        Arc::new(Self {
            snapshots: Mutex::new(HashMap::new()),
            fail_fetch: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            push_mode: Mutex::new(mode),
            open_sockets: AtomicUsize::new(0),
            accepted_sockets: AtomicUsize::new(0),
            closed_by_client: AtomicUsize::new(0),
            last_push_query: Mutex::new(None),
        })
    }

    pub fn set_snapshot(&self, session_id: &str, status: &str) {
        self.snapshots.lock().unwrap().insert(
            session_id.to_string(),
            serde_json::json!({"sessionId": session_id, "status": status}),
        );
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

async fn get_session(
    State(game): State<Arc<FakeGame>>,
    Path(session_id): Path<String>,
) -> Response {
    game.fetches.fetch_add(1, Ordering::SeqCst);
    if game.fail_fetch.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response();
    }
    let snapshot = game.snapshots.lock().unwrap().get(&session_id).cloned();
    match snapshot {
        Some(s) => Json(s).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn push_channel(
    ws: WebSocketUpgrade,
    State(game): State<Arc<FakeGame>>,
    Path(_session_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    *game.last_push_query.lock().unwrap() = Some(query);
    let mode = game.push_mode.lock().unwrap().clone();
    match mode {
        PushMode::Refuse => return StatusCode::FORBIDDEN.into_response(),
        PushMode::Stall => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        _ => {}
    }
    ws.on_upgrade(move |socket| handle_socket(socket, game, mode))
}

async fn handle_socket(mut socket: WebSocket, game: Arc<FakeGame>, mode: PushMode) {
    game.accepted_sockets.fetch_add(1, Ordering::SeqCst);
    game.open_sockets.fetch_add(1, Ordering::SeqCst);

    match mode {
        PushMode::CloseAfterOpen => {
            let _ = socket.send(Message::Close(None)).await;
            game.open_sockets.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        PushMode::Send(frames) => {
            for frame in frames {
                if socket.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
        }
        PushMode::Hold | PushMode::Refuse | PushMode::Stall => {}
    }

    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    game.closed_by_client.fetch_add(1, Ordering::SeqCst);
    game.open_sockets.fetch_sub(1, Ordering::SeqCst);
}

/// Spawn the fake game API and return its base URL (`http://addr/api`)
pub async fn spawn_game_server(game: Arc<FakeGame>) -> String {
    let app = Router::new()
        .route("/api/multiplayer/sessions/:session_id", get(get_session))
        .route("/api/ws/multiplayer/:session_id", get(push_channel))
        .with_state(game);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://{}/api", addr)
}

/// Poll `cond` until it holds or five seconds pass
#[allow(dead_code)]
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}
