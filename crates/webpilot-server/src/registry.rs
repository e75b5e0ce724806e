use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};

use webpilot_core::ids::{ConnectionId, SessionId};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(90);

/// Metadata captured when the transport accepts a connection. Immutable for
/// the connection's lifetime.
#[derive(Clone, Debug, Default)]
pub struct ConnectionMeta {
    pub remote_addr: Option<String>,
    pub origin: Option<String>,
}

/// One live transport-level connection.
pub struct Connection {
    pub id: ConnectionId,
    pub remote_addr: Option<String>,
    pub origin: Option<String>,
    /// Set only by INIT/RESTORE_SESSION handling; None until first handshake.
    pub session_id: Option<SessionId>,
    pub connected_at: DateTime<Utc>,
    pub tx: mpsc::Sender<String>,
    pub connected: AtomicBool,
    pub last_pong: AtomicU64,
}

impl Connection {
    fn new(id: ConnectionId, meta: ConnectionMeta, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            remote_addr: meta.remote_addr,
            origin: meta.origin,
            session_id: None,
            connected_at: Utc::now(),
            tx,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn set_session(&mut self, session_id: SessionId) {
        self.session_id = Some(session_id);
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < CONNECTION_TIMEOUT.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Read-only view of a connection's metadata.
#[derive(Clone, Debug)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub remote_addr: Option<String>,
    pub origin: Option<String>,
    pub session_id: Option<SessionId>,
    pub connected_at: DateTime<Utc>,
}

/// Registry of live connections, owned by the server instance so multiple
/// instances can coexist in tests.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Mutex<Connection>>>,
    max_send_queue: usize,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new connection and return its ID plus the outbound receiver.
    /// Never fails; IDs are unique for the registry's lifetime.
    pub fn register(&self, meta: ConnectionMeta) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let conn = Arc::new(Mutex::new(Connection::new(id.clone(), meta, tx)));
        self.connections.insert(id.clone(), conn);
        (id, rx)
    }

    /// Remove a connection. Idempotent; removing an unknown ID is a no-op.
    pub fn remove(&self, id: &ConnectionId) {
        if let Some((_, conn)) = self.connections.remove(id) {
            if let Ok(c) = conn.try_lock() {
                c.connected.store(false, Ordering::Relaxed);
            }
        }
    }

    pub async fn lookup(&self, id: &ConnectionId) -> Option<ConnectionSnapshot> {
        let conn = self.connections.get(id)?;
        let c = conn.lock().await;
        Some(ConnectionSnapshot {
            id: c.id.clone(),
            remote_addr: c.remote_addr.clone(),
            origin: c.origin.clone(),
            session_id: c.session_id.clone(),
            connected_at: c.connected_at,
        })
    }

    /// Bind a session identifier to a connection.
    pub async fn set_session(&self, id: &ConnectionId, session_id: SessionId) {
        if let Some(conn) = self.connections.get(id) {
            conn.lock().await.set_session(session_id);
        }
    }

    /// Send a text frame to a connection. Returns false when the connection
    /// is gone or its queue is full; callers treat that as a discarded send,
    /// never an error.
    pub async fn send_to(&self, id: &ConnectionId, message: String) -> bool {
        if let Some(conn) = self.connections.get(id) {
            let tx = conn.lock().await.tx.clone();
            match tx.try_send(message) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(msg)) => {
                    tracing::warn!(
                        connection_id = %id,
                        msg_len = msg.len(),
                        "Send queue full, dropping message"
                    );
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        } else {
            false
        }
    }

    /// Number of live connections, for the health surface.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn record_pong(&self, id: &ConnectionId) {
        if let Some(conn) = self.connections.get(id) {
            if let Ok(c) = conn.try_lock() {
                c.record_pong();
            }
        }
    }

    pub fn mark_disconnected(&self, id: &ConnectionId) {
        if let Some(conn) = self.connections.get(id) {
            if let Ok(c) = conn.try_lock() {
                c.connected.store(false, Ordering::Relaxed);
            }
        }
    }

    /// Remove connections that stopped answering pings.
    pub fn cleanup_dead_connections(&self) -> usize {
        let dead: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter_map(|entry| {
                if let Ok(conn) = entry.value().try_lock() {
                    if !conn.is_alive() {
                        return Some(conn.id.clone());
                    }
                }
                None
            })
            .collect();

        let removed = dead.len();
        for id in dead {
            self.remove(&id);
            tracing::info!(connection_id = %id, "Cleaned up dead connection");
        }
        removed
    }
}

/// Start a background task that periodically sweeps dead connections.
pub fn start_cleanup_task(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_connections();
            if removed > 0 {
                tracing::info!(removed = removed, "Dead connection sweep");
            }
        }
    })
}
