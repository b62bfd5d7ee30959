//! # imgcache-core
//!
//! Core functionality for imgcache - a persistent metadata cache for Imgur
//! albums and images embedded in documentation builds.
//!
//! Document markup references Imgur objects by ID (`a/V76cJ` for an album,
//! `hiX02` for an image). This crate keeps the titles, descriptions, and
//! member lists for those IDs in a local snapshot so builds stay fast and
//! work offline, refreshing entries from the Imgur REST API only once their
//! TTL has elapsed.
//!
//! ## Architecture
//!
//! The crate is organized around several key components:
//!
//! - **Types**: ID classification and the cached entry shapes
//! - **Store**: the keyed in-memory cache with ensure/prune/merge operations
//! - **Refresh**: TTL-driven staleness and album-to-member fetch batching
//! - **Client**: the Imgur API HTTP client with structured error taxonomy
//! - **Storage**: atomic snapshot persistence under the data directory
//! - **Session**: one build cycle's facade over all of the above
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgcache_core::{BuildSession, CacheConfig, ImgurRef};
//!
//! # async fn build() -> imgcache_core::Result<()> {
//! let config = CacheConfig::new("13d3c73555f2190");
//! let mut session = BuildSession::begin(config)?;
//!
//! // While reading documents:
//! session.note_ref(&ImgurRef::parse("a/V76cJ"));
//!
//! // Between reading and rendering:
//! let summary = session.refresh().await;
//! println!("fetched {} albums", summary.albums_fetched);
//!
//! // At render time:
//! if let Some(entry) = session.resolve(&ImgurRef::parse("a/V76cJ")) {
//!     println!("{}", entry.title());
//! }
//!
//! session.finish()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Fetch-level failures ([`Error::is_fetch_failure`]) are recoverable: the
//! refresh logs them, keeps the previous entry, and retries next cycle.
//! Configuration and storage errors abort the operation that hit them.

/// HTTP client for the Imgur REST API
pub mod client;
/// Configuration loading and credential validation
pub mod config;
/// Error types and result aliases
pub mod error;
/// Refresh orchestration over stale cache entries
pub mod refresh;
/// One build cycle's session facade
pub mod session;
/// Local filesystem persistence of the cache snapshot
pub mod storage;
/// The keyed in-memory metadata cache
pub mod store;
/// Core data types and structures
pub mod types;

// Re-export commonly used types
pub use client::{API_URL, AlbumPayload, ImagePayload, ImgurClient};
pub use config::{CacheConfig, DEFAULT_TTL, validate_client_id};
pub use error::{Error, Result};
pub use refresh::{RefreshSummary, RemoteSource, refresh_cache};
pub use session::BuildSession;
pub use storage::Storage;
pub use store::MetadataCache;
pub use types::{AlbumEntry, CacheEntry, DocumentRefs, ImageEntry, ImgurRef};
