use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use webpilot_core::ids::ConnectionId;
use webpilot_llm::PlanGenerator;

use crate::config::ServerConfig;
use crate::registry::{self, ConnectionMeta, ConnectionRegistry};
use crate::session::SessionProtocol;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub protocol: Arc<SessionProtocol>,
    pub message_tx: mpsc::Sender<(ConnectionId, String)>,
    pub allowed_origins: Arc<Vec<String>>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.allowed_origins);
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(cors)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
}

/// Empty allow-list accepts any origin, including clients that send none.
fn origin_allowed(allowed_origins: &[String], origin: Option<&str>) -> bool {
    if allowed_origins.is_empty() {
        return true;
    }
    match origin {
        Some(origin) => allowed_origins.iter().any(|o| o == origin),
        None => false,
    }
}

/// Create and start the server. Returns a handle that keeps the background
/// tasks alive.
pub async fn start(
    config: ServerConfig,
    generator: Option<Arc<dyn PlanGenerator>>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ConnectionRegistry::new(config.max_send_queue));
    let protocol = Arc::new(SessionProtocol::new(Arc::clone(&registry), generator));

    let _cleanup = registry::start_cleanup_task(Arc::clone(&registry), CLEANUP_INTERVAL);

    // Single dispatch loop: all inbound frames from all connections are
    // processed here in arrival order.
    let (msg_tx, msg_rx) = mpsc::channel::<(ConnectionId, String)>(1024);
    let dispatch = tokio::spawn(process_messages(msg_rx, Arc::clone(&protocol)));

    let app_state = AppState {
        registry,
        protocol,
        message_tx: msg_tx,
        allowed_origins: Arc::new(config.allowed_origins.clone()),
    };

    let router = build_router(app_state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "Webpilot server started");

    let server = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server,
        _dispatch: dispatch,
        _cleanup,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _dispatch: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler. Origin policy is enforced here, before the
/// connection ever reaches the session protocol.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !origin_allowed(&state.allowed_origins, origin.as_deref()) {
        tracing::warn!(
            remote_addr = %addr,
            origin = origin.as_deref().unwrap_or("<none>"),
            "Rejected connection from disallowed origin"
        );
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, addr, origin))
        .into_response()
}

/// Handle a newly accepted WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState, addr: SocketAddr, origin: Option<String>) {
    let meta = ConnectionMeta {
        remote_addr: Some(addr.to_string()),
        origin,
    };
    let (conn_id, rx) = state.registry.register(meta);
    tracing::info!(connection_id = %conn_id, remote_addr = %addr, "Client connected");

    state.protocol.on_connect(&conn_id).await;

    run_ws_connection(
        socket,
        conn_id.clone(),
        rx,
        Arc::clone(&state.registry),
        state.message_tx.clone(),
    )
    .await;

    state.protocol.on_disconnect(&conn_id);
}

/// Split the socket into reader/writer and run both until either side ends.
async fn run_ws_connection(
    socket: WebSocket,
    conn_id: ConnectionId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ConnectionRegistry>,
    on_message: mpsc::Sender<(ConnectionId, String)>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward outbound frames + periodic ping.
    let writer_cid = conn_id.clone();
    let writer_registry = Arc::clone(&registry);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(connection_id = %writer_cid, "Sent ping");
                }
            }
        }

        writer_registry.mark_disconnected(&writer_cid);
    });

    // Reader task: forward inbound frames to the dispatch loop, track pongs.
    // A transport error does not force closure; only the close event does.
    let reader_cid = conn_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => {
                    let _ = on_message.send((reader_cid.clone(), text.to_string())).await;
                }
                Ok(WsMessage::Pong(_)) => {
                    reader_registry.record_pong(&reader_cid);
                }
                Ok(WsMessage::Close(_)) => break,
                Ok(WsMessage::Ping(_)) => {} // axum replies with pong automatically
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(connection_id = %reader_cid, error = %e, "Transport error");
                }
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }
}

/// Health check HTTP endpoint: liveness plus live connection count.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "connections": state.registry.count(),
        })),
    )
}

/// Process inbound frames from all connections on one dispatch loop.
async fn process_messages(
    mut rx: mpsc::Receiver<(ConnectionId, String)>,
    protocol: Arc<SessionProtocol>,
) {
    while let Some((conn_id, raw)) = rx.recv().await {
        protocol.handle_frame(&conn_id, &raw).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_allowed_with_empty_list_accepts_everything() {
        assert!(origin_allowed(&[], Some("chrome-extension://abc")));
        assert!(origin_allowed(&[], None));
    }

    #[test]
    fn origin_allowed_matches_exactly() {
        let allowed = vec!["chrome-extension://abc".to_string()];
        assert!(origin_allowed(&allowed, Some("chrome-extension://abc")));
        assert!(!origin_allowed(&allowed, Some("chrome-extension://evil")));
        assert!(!origin_allowed(&allowed, Some("chrome-extension://abcd")));
    }

    #[test]
    fn origin_allowed_requires_header_when_list_is_set() {
        let allowed = vec!["https://app.example.com".to_string()];
        assert!(!origin_allowed(&allowed, None));
    }

    #[test]
    fn build_router_creates_routes() {
        let registry = Arc::new(ConnectionRegistry::new(32));
        let protocol = Arc::new(SessionProtocol::new(Arc::clone(&registry), None));
        let (msg_tx, _) = mpsc::channel(32);

        let state = AppState {
            registry,
            protocol,
            message_tx: msg_tx,
            allowed_origins: Arc::new(Vec::new()),
        };

        let _router = build_router(state);
        // If this doesn't panic, the router was built successfully
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let config = ServerConfig {
            port: 0, // Random port
            ..Default::default()
        };

        let handle = start(config, None).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
    }
}
