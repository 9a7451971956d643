//! Core domain logic for Thyself.
//!
//! This crate ties the observer and the stores together:
//! - [`sanitizer`] — Raw candidates → canonical events
//! - [`router`] — The request/response protocol over the stores
//! - [`bridge`] / [`transport`] — Relay envelopes and transport selection
//! - [`pipeline`] — Async harvest driver (signals → observer → router)
//! - [`sync`] — Orchestrator pass against the analysis backend

pub mod bridge;
pub mod lane;
pub mod pipeline;
pub mod router;
pub mod sanitizer;
pub mod sync;
pub mod transport;

pub use bridge::{BridgeRelay, InboundEnvelope, OriginPolicy, OutboundEnvelope};
pub use lane::TitleLane;
pub use pipeline::{FeedSignal, HarvestPipeline, HarvestStats};
pub use router::{Action, Response, Router};
pub use sanitizer::{sanitize, sanitize_at, sanitize_event};
pub use sync::{BackendClient, SyncReport, sync_once};
pub use transport::{DirectTransport, RelayTransport, Transport, TransportSelector};
