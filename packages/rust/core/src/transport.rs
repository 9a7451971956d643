//! Orchestrator-side transports and the relay-first selection strategy.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bridge::{BridgeRelay, InboundEnvelope, NAMESPACE_IN, NAMESPACE_OUT, OutboundEnvelope};
use crate::router::{Response, Router};

/// One way of getting a request to the router. `None` means no answer.
pub trait Transport: Send + Sync {
    fn request(
        &self,
        action: &str,
        payload: Value,
    ) -> impl Future<Output = Option<Response>> + Send;
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Response>>>>;

/// Posts `in` envelopes to the embedding context and matches `out`
/// envelopes back to callers by request id.
#[derive(Clone)]
pub struct RelayTransport {
    outbound: mpsc::UnboundedSender<InboundEnvelope>,
    pending: Pending,
}

/// Removes the pending entry if the caller stops waiting.
struct PendingGuard {
    pending: Pending,
    request_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Ok(mut map) = self.pending.lock() {
            map.remove(&self.request_id);
        }
    }
}

impl RelayTransport {
    /// `outbound` carries envelopes to the embedding context; answers come
    /// back through [`RelayTransport::deliver`].
    pub fn new(outbound: mpsc::UnboundedSender<InboundEnvelope>) -> Self {
        Self {
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wire the transport to an in-process relay under `origin`.
    pub fn connect(relay: BridgeRelay, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<InboundEnvelope>();
        let transport = Self::new(tx);
        let inbox = transport.pending.clone();

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let relay = relay.clone();
                let origin = origin.clone();
                let inbox = inbox.clone();
                tokio::spawn(async move {
                    let data = match serde_json::to_value(&envelope) {
                        Ok(data) => data,
                        Err(e) => {
                            warn!(error = %e, "failed to encode envelope");
                            return;
                        }
                    };
                    if let Some(out) = relay.relay(&origin, data).await {
                        deliver_to(&inbox, out);
                    }
                });
            }
        });
        transport
    }

    /// Route an `out` envelope to its waiting caller. Returns `false` if
    /// nobody is waiting for it.
    pub fn deliver(&self, envelope: OutboundEnvelope) -> bool {
        deliver_to(&self.pending, envelope)
    }
}

fn deliver_to(pending: &Pending, envelope: OutboundEnvelope) -> bool {
    if envelope.namespace != NAMESPACE_OUT {
        return false;
    }
    let waiter = pending
        .lock()
        .ok()
        .and_then(|mut map| map.remove(&envelope.request_id));
    match waiter {
        Some(tx) => tx.send(envelope.response).is_ok(),
        None => {
            debug!(request_id = %envelope.request_id, "late or unknown relay answer");
            false
        }
    }
}

impl Transport for RelayTransport {
    async fn request(&self, action: &str, payload: Value) -> Option<Response> {
        let request_id = Uuid::now_v7().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().ok()?.insert(request_id.clone(), tx);
        let _guard = PendingGuard {
            pending: self.pending.clone(),
            request_id: request_id.clone(),
        };

        let envelope = InboundEnvelope {
            namespace: NAMESPACE_IN.to_string(),
            action: action.to_string(),
            payload,
            request_id,
        };
        if self.outbound.send(envelope).is_err() {
            debug!("relay channel closed");
            return None;
        }
        rx.await.ok()
    }
}

// ---------------------------------------------------------------------------
// Direct
// ---------------------------------------------------------------------------

/// Calls the router directly. Needs the host's endpoint id; without one it
/// never answers.
#[derive(Clone)]
pub struct DirectTransport {
    router: Router,
    endpoint_id: Option<String>,
}

impl DirectTransport {
    pub fn new(router: Router, endpoint_id: Option<String>) -> Self {
        Self {
            router,
            endpoint_id: endpoint_id.filter(|id| !id.trim().is_empty()),
        }
    }
}

impl Transport for DirectTransport {
    async fn request(&self, action: &str, payload: Value) -> Option<Response> {
        let Some(endpoint) = self.endpoint_id.as_deref() else {
            debug!(%action, "no endpoint id configured, direct transport unavailable");
            return None;
        };
        debug!(%action, %endpoint, "direct request");
        Some(self.router.handle(action, payload).await)
    }
}

/// In-process use (CLI, tests): the router always answers.
impl Transport for Router {
    async fn request(&self, action: &str, payload: Value) -> Option<Response> {
        Some(self.handle(action, payload).await)
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Relay first; the direct transport only when the relay gives no answer
/// within the timeout (or fails outright).
pub struct TransportSelector<R, D> {
    relay: R,
    direct: D,
    relay_timeout: Duration,
}

impl<R: Transport, D: Transport> TransportSelector<R, D> {
    pub fn new(relay: R, direct: D, relay_timeout: Duration) -> Self {
        Self {
            relay,
            direct,
            relay_timeout,
        }
    }
}

impl<R: Transport, D: Transport> Transport for TransportSelector<R, D> {
    async fn request(&self, action: &str, payload: Value) -> Option<Response> {
        match tokio::time::timeout(self.relay_timeout, self.relay.request(action, payload.clone()))
            .await
        {
            Ok(Some(response)) => return Some(response),
            Ok(None) => debug!(%action, "relay gave no answer, trying direct"),
            Err(_) => debug!(
                %action,
                timeout_ms = self.relay_timeout.as_millis() as u64,
                "relay timed out, trying direct"
            ),
        }
        self.direct.request(action, payload).await
    }
}
