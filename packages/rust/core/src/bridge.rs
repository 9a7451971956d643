//! Bridge relay: forwards namespaced envelopes from an embedding context
//! into the [`Router`], after checking the declared origin.
//!
//! Envelopes with the wrong namespace, a rejected origin, or an unknown
//! action are dropped without an answer; the caller's timeout handles them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thyself_shared::{Result, ThyselfError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::{Origin, Url};

use crate::router::{Action, Response, Router};

/// Namespace of requests travelling into the relay.
pub const NAMESPACE_IN: &str = "in";
/// Namespace of answers travelling back out.
pub const NAMESPACE_OUT: &str = "out";

/// Request envelope posted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    pub namespace: String,
    pub action: String,
    #[serde(default)]
    pub payload: Value,
    pub request_id: String,
}

/// Answer envelope emitted by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope {
    pub namespace: String,
    pub request_id: String,
    pub response: Response,
}

/// One line of the stdio embedding transport.
#[derive(Debug, Deserialize)]
struct RelayFrame {
    origin: String,
    data: Value,
}

// ---------------------------------------------------------------------------
// Origin policy
// ---------------------------------------------------------------------------

/// Exact scheme/host/port allow-list.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: Vec<Origin>,
}

impl OriginPolicy {
    pub fn new(origins: &[String]) -> Result<Self> {
        let allowed = origins
            .iter()
            .map(|raw| {
                Url::parse(raw)
                    .map(|url| url.origin())
                    .map_err(|e| ThyselfError::config(format!("invalid allowed origin '{raw}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { allowed })
    }

    pub fn allows(&self, origin: &str) -> bool {
        match Url::parse(origin) {
            Ok(url) => {
                let origin = url.origin();
                origin.is_tuple() && self.allowed.contains(&origin)
            }
            Err(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct BridgeRelay {
    router: Router,
    policy: Arc<OriginPolicy>,
}

impl BridgeRelay {
    pub fn new(router: Router, policy: OriginPolicy) -> Self {
        Self {
            router,
            policy: Arc::new(policy),
        }
    }

    /// Validate one message and forward it. `None` means it was dropped.
    pub async fn relay(&self, origin: &str, data: Value) -> Option<OutboundEnvelope> {
        if !self.policy.allows(origin) {
            debug!(%origin, "origin rejected");
            return None;
        }

        let envelope: InboundEnvelope = match serde_json::from_value(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "not a relay envelope");
                return None;
            }
        };
        if envelope.namespace != NAMESPACE_IN {
            debug!(namespace = %envelope.namespace, "foreign namespace ignored");
            return None;
        }
        let Some(action) = Action::from_wire(&envelope.action) else {
            debug!(action = %envelope.action, "unknown action dropped");
            return None;
        };

        let response = self.router.dispatch(action, envelope.payload).await;
        Some(OutboundEnvelope {
            namespace: NAMESPACE_OUT.to_string(),
            request_id: envelope.request_id,
            response,
        })
    }

    /// Serve JSON lines (`{"origin", "data"}`) from `reader`, writing one
    /// answer envelope per line to `writer`. Each message is handled on its
    /// own task. Returns the writer once input ends and all answers are out.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<W>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let write_task = tokio::spawn(async move {
            while let Some(line) = out_rx.recv().await {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<_, std::io::Error>(writer)
        });

        info!("relay listening on stdio");
        let mut lines = reader.lines();
        let mut received = 0usize;
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ThyselfError::io("<stdin>", e))?
        {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let frame: RelayFrame = match serde_json::from_str(trimmed) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "malformed relay line skipped");
                    continue;
                }
            };
            received += 1;

            let relay = self.clone();
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                let Some(out) = relay.relay(&frame.origin, frame.data).await else {
                    return;
                };
                match serde_json::to_string(&out) {
                    Ok(json) => {
                        let _ = out_tx.send(json);
                    }
                    Err(e) => warn!(error = %e, "failed to encode relay answer"),
                }
            });
        }
        drop(out_tx);

        let writer = write_task
            .await
            .map_err(|e| ThyselfError::Protocol(format!("relay writer task failed: {e}")))?
            .map_err(|e| ThyselfError::io("<stdout>", e))?;
        info!(received, "relay input closed");
        Ok(writer)
    }
}
