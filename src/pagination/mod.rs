//! Pagination engine and its supporting pieces

pub mod adaptive_timer;
pub mod checkpoint;
pub mod content_hash;
pub mod engine;
pub mod memory_monitor;
pub mod methods;
pub mod types;

pub use adaptive_timer::AdaptiveTimer;
pub use checkpoint::{
    CHECKPOINT_TTL, CHECKPOINT_VERSION, Checkpoint, CheckpointData, CheckpointManager,
};
pub use content_hash::{ContentHasher, DEFAULT_LOOKBACK, fingerprint};
pub use engine::{PaginationEngine, PaginationEngineBuilder};
pub use memory_monitor::{MemoryMonitor, MemoryProbe, NoopMemoryProbe};
pub use methods::{PageDriver, select_method};
pub use types::{
    ImageRecord, LazyLoadOptions, PaginationMethod, PaginationState, RunSummary, StopReason,
};
