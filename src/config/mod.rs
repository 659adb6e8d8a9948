//! Settings: the single source of truth for tunables

mod builder;
mod types;

pub use builder::SettingsBuilder;
pub use types::{DownloadSettings, MemorySettings, PaginationSettings, Settings, TimingMode};
