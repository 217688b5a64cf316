//! Keeps local Parquet archives of the ANP "last four weeks" fuel-price
//! surveys, appending each new snapshot exactly once.

pub mod archive;
pub mod config;
pub mod family;
pub mod fetch;
pub mod gate;
pub mod history;
pub mod reconcile;
pub mod snapshot;
pub mod sync;

pub use archive::Archive;
pub use config::Config;
pub use family::{Family, FamilySpec};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use gate::{Always, DayOfMonth, Trigger};
pub use reconcile::{ChangeDetector, WholeSnapshotEquality};
pub use snapshot::Snapshot;
pub use sync::{FamilyStatus, RunSummary, Synchronizer};
