//! Download queue: bounded concurrency, linear retry backoff, batch
//! confirmation gate

pub mod manager;
pub mod types;

pub use manager::{DownloadGauges, DownloadManager, DownloadRunReport};
pub use types::{AlwaysContinue, Confirmer, DownloadFetcher, DownloadQueueItem};
