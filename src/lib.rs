//! Core of a browser-hosted image-gallery scraping agent
//!
//! The crate is host-agnostic: everything DOM-, storage- or
//! network-shaped enters through capability traits ([`PageDriver`],
//! [`ImageExtractor`], [`GalleryDetector`], [`SlotStore`],
//! [`MemoryProbe`], download fetchers). What lives here is the logic that
//! must behave identically regardless of host:
//!
//! - the pagination run lifecycle and its loop safety nets (page and
//!   attempt ceilings, duplicate-content detection, adaptive pacing,
//!   memory-pressure self-pause, periodic checkpoints)
//! - cross-context coordination: envelopes, request/response routing with
//!   deadlines, named locks over shared run state, and a best-effort
//!   status broadcast bus
//! - the download queue with bounded concurrency, linear retry backoff
//!   and a batch confirmation gate
//! - export of the collected records

pub mod config;
pub mod coordination;
pub mod download;
pub mod errors;
pub mod export;
pub mod extraction;
pub mod pagination;
pub mod storage;

pub use config::{DownloadSettings, MemorySettings, PaginationSettings, Settings, TimingMode};
pub use coordination::{
    ChannelTransport, ContextId, CoordinationError, Envelope, MessageRouter, Response, RunStatus,
    StateManager, StatusBus, StatusEvent, ToastLevel,
};
pub use download::{AlwaysContinue, Confirmer, DownloadFetcher, DownloadManager, DownloadQueueItem};
pub use errors::PaginationError;
pub use export::{ExportFormat, ExportOptions, ExportResult, Exporter, JsonExporter};
pub use extraction::{DetectionResult, GalleryDetector, ImageExtractor};
pub use pagination::{
    ImageRecord, LazyLoadOptions, MemoryProbe, PageDriver, PaginationEngine, PaginationMethod,
    PaginationState, RunSummary, StopReason,
};
pub use storage::{FileSlotStore, MemorySlotStore, SlotStore, StorageError};
