// src/history/mod.rs

pub mod synced;
pub mod table_history;

pub use synced::{SyncOutcome, SyncRow};
pub use table_history::{HistoryRow, TableHistory};

/// Checkpoint table recording every family sync.
pub type SyncHistory = TableHistory<SyncRow>;
