//! Per-connection message handling: the session lifecycle and task-plan
//! request protocol.

use std::sync::Arc;

use chrono::Utc;

use webpilot_core::errors::ProtocolError;
use webpilot_core::ids::{ConnectionId, SessionId, TaskId};
use webpilot_llm::PlanGenerator;

use crate::registry::ConnectionRegistry;
use crate::wire::{self, Inbound, Outbound};

/// Interprets inbound frames per connection, drives INIT/RESTORE, and
/// dispatches plan requests to the generator.
///
/// There is no handshake gate: INIT and RESTORE_SESSION are ordinary messages,
/// and a client may send ANALYZE_TASK before ever sending INIT.
pub struct SessionProtocol {
    registry: Arc<ConnectionRegistry>,
    /// None when generator construction failed at startup (degraded mode);
    /// plan requests then answer "service unavailable".
    generator: Option<Arc<dyn PlanGenerator>>,
}

impl SessionProtocol {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        generator: Option<Arc<dyn PlanGenerator>>,
    ) -> Self {
        Self {
            registry,
            generator,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Greet a freshly accepted connection. A failed send is logged, not
    /// fatal.
    pub async fn on_connect(&self, conn_id: &ConnectionId) {
        let sent = self
            .send(
                conn_id,
                &Outbound::ConnectionEstablished {
                    client_id: conn_id.clone(),
                    timestamp: Utc::now().to_rfc3339(),
                },
            )
            .await;
        if !sent {
            tracing::warn!(connection_id = %conn_id, "Failed to send connection greeting");
        }
    }

    /// Transport reported the connection closed. In-flight plan calls keep
    /// running; their eventual send becomes a no-op.
    pub fn on_disconnect(&self, conn_id: &ConnectionId) {
        self.registry.remove(conn_id);
        tracing::info!(connection_id = %conn_id, "Connection closed");
    }

    /// Handle one raw text frame. Every failure is converted to an outbound
    /// ERROR; nothing here ever closes the connection.
    pub async fn handle_frame(&self, conn_id: &ConnectionId, raw: &str) {
        match wire::decode(raw) {
            Ok(msg) => self.dispatch(conn_id, msg).await,
            Err(err) => {
                tracing::warn!(
                    connection_id = %conn_id,
                    kind = err.error_kind(),
                    error = %err,
                    "Failed to decode frame"
                );
                self.send_error(conn_id, &err).await;
            }
        }
    }

    async fn dispatch(&self, conn_id: &ConnectionId, msg: Inbound) {
        match msg {
            Inbound::Init { session_id } => {
                // Fall back to the connection's own identity when the client
                // supplies none. Idempotent: each receipt overwrites and
                // replies again.
                let session_id =
                    session_id.unwrap_or_else(|| SessionId::from_raw(conn_id.as_str()));
                self.registry.set_session(conn_id, session_id.clone()).await;
                self.send(conn_id, &Outbound::SessionInit { session_id }).await;
            }
            Inbound::RestoreSession { session_id } => {
                // Pure rebind: no backing session store exists, so no prior
                // task state is restored.
                self.registry.set_session(conn_id, session_id.clone()).await;
                self.send(conn_id, &Outbound::SessionRestored { session_id })
                    .await;
            }
            Inbound::AnalyzeTask { task } => {
                self.spawn_plan_request(conn_id, task, TaskId::new()).await;
            }
            Inbound::ExecuteCommand { command, task_id } => {
                let task_id = task_id.unwrap_or_default();
                self.spawn_plan_request(conn_id, command, task_id).await;
            }
            Inbound::BrowserState { state } => {
                // Informational only; no reply.
                tracing::debug!(
                    connection_id = %conn_id,
                    url = state.get("url").and_then(|u| u.as_str()).unwrap_or(""),
                    "Browser state update"
                );
            }
            Inbound::Unknown { msg_type } => {
                tracing::warn!(connection_id = %conn_id, msg_type = %msg_type, "Unknown message type");
                self.send(
                    conn_id,
                    &Outbound::Error {
                        error: "unknown message type".into(),
                    },
                )
                .await;
            }
        }
    }

    /// Start an independent plan request. No queueing or single-flight: a
    /// second request on the same connection runs concurrently with the
    /// first, and replies arrive in completion order.
    async fn spawn_plan_request(&self, conn_id: &ConnectionId, command: String, task_id: TaskId) {
        let Some(generator) = self.generator.clone() else {
            self.send_error(conn_id, &ProtocolError::ServiceUnavailable)
                .await;
            return;
        };

        let registry = Arc::clone(&self.registry);
        let conn_id = conn_id.clone();
        tokio::spawn(async move {
            let reply = match generator.create_plan(&command).await {
                Ok(plan) => Outbound::TaskPlanReady {
                    task_id: task_id.clone(),
                    plan,
                },
                Err(err) => {
                    tracing::warn!(
                        connection_id = %conn_id,
                        task_id = %task_id,
                        kind = err.error_kind(),
                        error = %err,
                        "Plan generation failed"
                    );
                    Outbound::Error {
                        error: ProtocolError::Generation(err).client_message(),
                    }
                }
            };

            let sent = registry.send_to(&conn_id, wire::encode(&reply)).await;
            if !sent {
                tracing::debug!(
                    connection_id = %conn_id,
                    task_id = %task_id,
                    "Connection gone, plan result discarded"
                );
            }
        });
    }

    async fn send(&self, conn_id: &ConnectionId, msg: &Outbound) -> bool {
        self.registry.send_to(conn_id, wire::encode(msg)).await
    }

    async fn send_error(&self, conn_id: &ConnectionId, err: &ProtocolError) {
        self.send(
            conn_id,
            &Outbound::Error {
                error: err.client_message(),
            },
        )
        .await;
    }
}
