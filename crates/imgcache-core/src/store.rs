//! The keyed store of cached Imgur metadata.
//!
//! One [`MetadataCache`] value is owned by each build process (or worker).
//! Albums and images live in separate ordered maps so the two kinds stay
//! distinct after ID classification, and so iteration order — and therefore
//! refresh request order — is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{AlbumEntry, CacheEntry, DocumentRefs, ImageEntry, ImgurRef};

/// Cache of Imgur album and image metadata, keyed by bare Imgur ID.
///
/// Entries are created by [`ensure_present`](Self::ensure_present), mutated
/// only by the refresh orchestrator on successful fetches, removed only by
/// [`prune`](Self::prune), and survive build cycles through the persisted
/// snapshot (see [`Storage`](crate::Storage)).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataCache {
    #[serde(default)]
    albums: BTreeMap<String, AlbumEntry>,
    #[serde(default)]
    images: BTreeMap<String, ImageEntry>,
}

impl MetadataCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert never-fetched entries for every referenced ID not already
    /// present.
    ///
    /// Idempotent: existing entries are never overwritten, so calling this
    /// twice with the same IDs leaves the store unchanged.
    pub fn ensure_present(&mut self, refs: &DocumentRefs) {
        for id in &refs.albums {
            self.ensure_album(id);
        }
        for id in &refs.images {
            self.ensure_image(id);
        }
    }

    /// Insert a never-fetched album entry if the ID is unknown.
    pub fn ensure_album(&mut self, id: &str) -> &mut AlbumEntry {
        self.albums
            .entry(id.to_string())
            .or_insert_with(|| AlbumEntry::new(id))
    }

    /// Insert a never-fetched image entry if the ID is unknown.
    pub fn ensure_image(&mut self, id: &str) -> &mut ImageEntry {
        self.images
            .entry(id.to_string())
            .or_insert_with(|| ImageEntry::new(id))
    }

    /// Remove entries no longer referenced by any current document.
    ///
    /// `referenced` must cover **all** current documents, not just changed
    /// ones. Albums are pruned first, then image reachability is recomputed
    /// (directly referenced, or a member of a surviving album), so members of
    /// an orphaned album are correctly considered unreachable. Entries whose
    /// map key disagrees with their recorded ID are dropped as defensive
    /// cleanup against incompatible persisted state.
    ///
    /// Returns the number of entries removed. Running prune twice in a row is
    /// a no-op.
    pub fn prune(&mut self, referenced: &DocumentRefs) -> usize {
        let before = self.albums.len() + self.images.len();

        // Key mismatches first, so a mislabeled album cannot keep its members
        // reachable below.
        self.albums.retain(|key, album| {
            let keep = *key == album.id;
            if !keep {
                debug!("removing {key} from album cache: recorded ID {} does not match", album.id);
            }
            keep
        });
        self.images.retain(|key, image| {
            let keep = *key == image.id;
            if !keep {
                debug!("removing {key} from image cache: recorded ID {} does not match", image.id);
            }
            keep
        });

        self.albums.retain(|key, _| {
            let keep = referenced.albums.contains(key);
            if !keep {
                debug!("removing {key} from album cache: not referenced by any document");
            }
            keep
        });

        let mut reachable: BTreeSet<&String> = referenced.images.iter().collect();
        for album in self.albums.values() {
            reachable.extend(album.image_ids.iter());
        }
        let reachable: BTreeSet<String> = reachable.into_iter().cloned().collect();
        self.images.retain(|key, _| {
            let keep = reachable.contains(key);
            if !keep {
                debug!("removing {key} from image cache: not referenced by any document or album");
            }
            keep
        });

        before - (self.albums.len() + self.images.len())
    }

    /// Combine another worker's store into this one.
    ///
    /// For each key present in `other`: insert it if absent locally, else
    /// keep whichever copy has the greater fetch timestamp (a successful
    /// fetch always wins over a never-fetched entry; ties keep the local
    /// copy). Commutative and associative over distinct fetch times, so
    /// merging any number of worker stores in any order converges.
    pub fn merge(&mut self, other: Self) {
        for (id, album) in other.albums {
            match self.albums.get(&id) {
                Some(existing) if existing.fetched_at >= album.fetched_at => {},
                _ => {
                    self.albums.insert(id, album);
                },
            }
        }
        for (id, image) in other.images {
            match self.images.get(&id) {
                Some(existing) if existing.fetched_at >= image.fetched_at => {},
                _ => {
                    self.images.insert(id, image);
                },
            }
        }
    }

    /// Look up the entry for a classified reference.
    ///
    /// Returns `None` when the ID is not yet available; the renderer falls
    /// back to placeholder text rather than failing the build.
    #[must_use]
    pub fn resolve(&self, imgur_ref: &ImgurRef) -> Option<CacheEntry<'_>> {
        match imgur_ref {
            ImgurRef::Album(id) => self.albums.get(id).map(CacheEntry::Album),
            ImgurRef::Image(id) => self.images.get(id).map(CacheEntry::Image),
        }
    }

    /// The cached album entry for `id`, if present.
    #[must_use]
    pub fn album(&self, id: &str) -> Option<&AlbumEntry> {
        self.albums.get(id)
    }

    /// The cached image entry for `id`, if present.
    #[must_use]
    pub fn image(&self, id: &str) -> Option<&ImageEntry> {
        self.images.get(id)
    }

    /// Mutable access to a cached album entry.
    pub(crate) fn album_mut(&mut self, id: &str) -> Option<&mut AlbumEntry> {
        self.albums.get_mut(id)
    }

    /// Mutable access to a cached image entry.
    pub(crate) fn image_mut(&mut self, id: &str) -> Option<&mut ImageEntry> {
        self.images.get_mut(id)
    }

    /// Iterate over cached albums in key order.
    pub fn albums(&self) -> impl Iterator<Item = &AlbumEntry> {
        self.albums.values()
    }

    /// Iterate over cached images in key order.
    pub fn images(&self) -> impl Iterator<Item = &ImageEntry> {
        self.images.values()
    }

    /// IDs of every album that lists `image_id` as a member, in key order.
    #[must_use]
    pub fn albums_containing(&self, image_id: &str) -> Vec<String> {
        self.albums
            .values()
            .filter(|album| album.image_ids.iter().any(|member| member == image_id))
            .map(|album| album.id.clone())
            .collect()
    }

    /// Every known ID as a reference set (the full-cache whitelist used for
    /// a first or forced build).
    #[must_use]
    pub fn known_refs(&self) -> DocumentRefs {
        DocumentRefs {
            albums: self.albums.keys().cloned().collect(),
            images: self.images.keys().cloned().collect(),
        }
    }

    /// Number of cached entries of both kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.albums.len() + self.images.len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.albums.is_empty() && self.images.is_empty()
    }

    /// Rebuild a cache from already-validated entries (snapshot loading).
    pub(crate) fn from_entries(
        albums: BTreeMap<String, AlbumEntry>,
        images: BTreeMap<String, ImageEntry>,
    ) -> Self {
        Self { albums, images }
    }
}
