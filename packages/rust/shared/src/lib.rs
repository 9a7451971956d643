//! Shared types, error model, and configuration for Thyself.
//!
//! This crate is the foundation depended on by all other Thyself crates.
//! It provides:
//! - [`ThyselfError`] — the unified error type
//! - Domain types ([`RawCandidate`], [`Event`], [`TitleBatchEntry`], [`ProfileHistogram`], [`ArchivePiece`])
//! - Configuration ([`AppConfig`], [`HarvestConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendConfig, BridgeConfig, HarvestConfig, ObserverConfig, RetentionConfig,
    StorageConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_db_path, validate_backend_url, validate_timings,
};
pub use error::{Result, ThyselfError};
pub use types::{
    ArchivePiece, DEFAULT_PLATFORM, Event, EventType, ProfileHistogram, RawCandidate,
    SourceVariant, SyncStatus, TitleBatchEntry,
};
