//! Refresh orchestration: decide which cached entries are stale and bring
//! them up to date from the remote API.
//!
//! An album query returns the metadata of every member image, so a stale
//! image whose album is already being fetched needs no request of its own.
//! The orchestrator promotes such albums into the stale set first ("parent
//! propagation"), fetches albums before images in key order, and only then
//! queries the images that are still stale — which also covers the case
//! where an album stopped embedding an image that a document still uses.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::client::{AlbumPayload, ImagePayload, ImgurClient};
use crate::error::Result;
use crate::store::MetadataCache;
use crate::types::DocumentRefs;

/// Abstraction over the remote metadata API used by refresh routines.
///
/// [`ImgurClient`] is the production implementation; tests substitute mocks.
#[async_trait]
pub trait RemoteSource {
    /// Fetch metadata for one album.
    async fn fetch_album(&self, id: &str) -> Result<AlbumPayload>;
    /// Fetch metadata for one standalone image.
    async fn fetch_image(&self, id: &str) -> Result<ImagePayload>;
}

#[async_trait]
impl RemoteSource for ImgurClient {
    async fn fetch_album(&self, id: &str) -> Result<AlbumPayload> {
        Self::fetch_album(self, id).await
    }

    async fn fetch_image(&self, id: &str) -> Result<ImagePayload> {
        Self::fetch_image(self, id).await
    }
}

/// Counts from one refresh pass, for the host's build report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Albums successfully fetched and written back.
    pub albums_fetched: usize,
    /// Standalone images successfully fetched and written back.
    pub images_fetched: usize,
    /// Per-ID fetch failures (logged and skipped).
    pub failures: usize,
}

impl RefreshSummary {
    /// Total number of requests issued.
    #[must_use]
    pub const fn requests(&self) -> usize {
        self.albums_fetched + self.images_fetched + self.failures
    }
}

/// Refresh the stale whitelisted entries of `cache` from `remote`.
///
/// An empty `whitelist` means "every known ID" (first or forced build).
/// `now` is injectable for deterministic tests; production callers pass the
/// current epoch seconds.
///
/// Per-ID failures never abort the batch: the affected entry keeps its
/// previous value, including its fetch timestamp, so the ID is retried on
/// the next cycle. When nothing is stale this is a true no-op: no request,
/// no mutation, no info-level log line.
pub async fn refresh_cache<S>(
    cache: &mut MetadataCache,
    remote: &S,
    whitelist: &DocumentRefs,
    ttl: u64,
    now: u64,
) -> RefreshSummary
where
    S: RemoteSource + Sync,
{
    let whitelist = if whitelist.is_empty() {
        cache.known_refs()
    } else {
        whitelist.clone()
    };
    cache.ensure_present(&whitelist);

    let mut stale_albums: BTreeSet<String> = whitelist
        .albums
        .iter()
        .filter(|id| cache.album(id).is_none_or(|album| album.is_stale(ttl, now)))
        .cloned()
        .collect();
    let stale_images: BTreeSet<String> = whitelist
        .images
        .iter()
        .filter(|id| cache.image(id).is_none_or(|image| image.is_stale(ttl, now)))
        .cloned()
        .collect();

    // Parent propagation: a stale image that belongs to a cached album gets
    // its data from the album query instead of a request of its own.
    let mut promoted: BTreeSet<String> = BTreeSet::new();
    for image_id in &stale_images {
        let parents = cache.albums_containing(image_id);
        if !parents.is_empty() {
            promoted.insert(image_id.clone());
            stale_albums.extend(parents);
        }
    }

    if stale_albums.is_empty() && stale_images.is_empty() {
        debug!("imgur metadata cache is up to date, nothing to refresh");
        return RefreshSummary::default();
    }

    let mut summary = RefreshSummary::default();

    // Albums first, lexicographic within each kind, so request order is
    // reproducible.
    for id in &stale_albums {
        match remote.fetch_album(id).await {
            Ok(payload) => {
                apply_album(cache, id, &payload, now);
                summary.albums_fetched += 1;
            },
            Err(err) => {
                warn!("leaving album {id} unchanged: {err}");
                summary.failures += 1;
            },
        }
    }

    // Whitelisted images that are still stale after the album pass: either
    // they have no parent album, the parent's fetch failed, or the parent no
    // longer embeds them.
    let leftover: Vec<String> = whitelist
        .images
        .iter()
        .filter(|id| cache.image(id).is_none_or(|image| image.is_stale(ttl, now)))
        .cloned()
        .collect();
    for id in &leftover {
        if promoted.contains(id) {
            warn!("album refresh did not carry data for image {id}, querying it directly");
        }
        match remote.fetch_image(id).await {
            Ok(payload) => {
                apply_image(cache, &payload, now);
                summary.images_fetched += 1;
            },
            Err(err) => {
                warn!("leaving image {id} unchanged: {err}");
                summary.failures += 1;
            },
        }
    }

    info!(
        "refreshed {} albums and {} images ({} failures)",
        summary.albums_fetched, summary.images_fetched, summary.failures
    );
    summary
}

/// Write a successful album response into the cache.
///
/// The member list is rebuilt from scratch: an image removed upstream
/// disappears from the cache's view of the album. Newly discovered members
/// are created on the spot before their fields are written.
fn apply_album(cache: &mut MetadataCache, id: &str, payload: &AlbumPayload, now: u64) {
    for image in &payload.images {
        apply_image(cache, image, now);
    }
    let album = cache.ensure_album(id);
    album.title.clone_from(&payload.title);
    album.description.clone_from(&payload.description);
    album.cover_id.clone_from(&payload.cover);
    album.image_ids = payload.images.iter().map(|image| image.id.clone()).collect();
    album.fetched_at = Some(now);
    debug!("updated album {id} with {} member images", album.image_ids.len());
}

/// Write a successful image response (standalone or embedded) into the cache.
fn apply_image(cache: &mut MetadataCache, payload: &ImagePayload, now: u64) {
    let image = cache.ensure_image(&payload.id);
    image.title.clone_from(&payload.title);
    image.description.clone_from(&payload.description);
    image.width = payload.width;
    image.height = payload.height;
    image.mime_type.clone_from(&payload.mime_type);
    image.fetched_at = Some(now);
}
