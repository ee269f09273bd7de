//! Mention leaderboard engine.
//!
//! Tracks how often one handle is mentioned, keeps a ranked snapshot of who
//! mentions it most, and refreshes that snapshot from a paginated search API
//! without ever blocking fresh reads on the network.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod feeds;
pub mod format;
pub mod query;
pub mod refresh;
pub mod scheduler;
pub mod snapshot;

pub use aggregate::{aggregate, AggregateEntry};
pub use config::Config;
pub use error::{FetchError, PersistenceError, RefreshError};
pub use feeds::twitter::TwitterSearch;
pub use feeds::{Author, FetchResult, Mention, PageRequest, PaginatedFetcher, SearchPage, SearchSource};
pub use format::{PersonalStats, Tier, UserStats};
pub use query::QueryService;
pub use refresh::{RefreshCoordinator, RefreshKind, RefreshOutcome, RefreshPolicy};
pub use scheduler::RefreshScheduler;
pub use snapshot::{Snapshot, SnapshotStore};
