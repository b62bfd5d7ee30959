//! Core data types for cached Imgur metadata.
//!
//! Imgur IDs are opaque, case-sensitive strings. Albums and images share one
//! namespace in document markup and are told apart by the `a/` prefix marker
//! (`a/V76cJ` is an album, `hiX02` an image). That classification happens
//! exactly once, when the raw string is parsed into an [`ImgurRef`]; from then
//! on the two kinds travel as separate types and the prefix is never
//! re-inspected.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Structural prefix that marks an album ID in document markup.
const ALBUM_MARKER: &str = "a/";

/// A classified reference to a remote Imgur object.
///
/// Holds the bare ID (marker stripped); the variant carries the kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImgurRef {
    /// Reference to an album (a container of images).
    Album(String),
    /// Reference to a standalone image.
    Image(String),
}

impl ImgurRef {
    /// Classify a raw ID string from document markup.
    ///
    /// `a/<id>` parses as an album reference, anything else as an image
    /// reference. The marker is stripped from the stored ID.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        raw.strip_prefix(ALBUM_MARKER).map_or_else(
            || Self::Image(raw.to_string()),
            |id| Self::Album(id.to_string()),
        )
    }

    /// The bare Imgur ID without the structural marker.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Album(id) | Self::Image(id) => id,
        }
    }

    /// Whether this reference points at an album.
    #[must_use]
    pub const fn is_album(&self) -> bool {
        matches!(self, Self::Album(_))
    }
}

impl fmt::Display for ImgurRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Album(id) => write!(f, "{ALBUM_MARKER}{id}"),
            Self::Image(id) => write!(f, "{id}"),
        }
    }
}

/// The sets of album and image IDs referenced by documents.
///
/// Produced by the document-discovery collaborator. The same shape serves as
/// the ensure-present input, the prune reference set, and the refresh
/// whitelist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRefs {
    /// Album IDs referenced directly by a document.
    #[serde(default)]
    pub albums: BTreeSet<String>,
    /// Image IDs referenced directly by a document.
    #[serde(default)]
    pub images: BTreeSet<String>,
}

impl DocumentRefs {
    /// An empty reference set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one classified reference.
    pub fn insert(&mut self, imgur_ref: &ImgurRef) {
        match imgur_ref {
            ImgurRef::Album(id) => {
                self.albums.insert(id.clone());
            },
            ImgurRef::Image(id) => {
                self.images.insert(id.clone());
            },
        }
    }

    /// Absorb another reference set (used when aggregating per-document sets).
    pub fn extend(&mut self, other: &Self) {
        self.albums.extend(other.albums.iter().cloned());
        self.images.extend(other.images.iter().cloned());
    }

    /// True when no album or image is referenced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.albums.is_empty() && self.images.is_empty()
    }
}

impl FromIterator<ImgurRef> for DocumentRefs {
    fn from_iter<T: IntoIterator<Item = ImgurRef>>(iter: T) -> Self {
        let mut refs = Self::new();
        for item in iter {
            refs.insert(&item);
        }
        refs
    }
}

/// Cached metadata for one Imgur album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumEntry {
    /// Bare Imgur ID of the album.
    pub id: String,
    /// Album title; empty until fetched.
    #[serde(default)]
    pub title: String,
    /// Album description; empty until fetched.
    #[serde(default)]
    pub description: String,
    /// ID of the image used as the album's representative thumbnail.
    #[serde(default)]
    pub cover_id: String,
    /// Member image IDs in the order returned by the Imgur API.
    ///
    /// Reflects only the last successful fetch; a failed refresh never
    /// mutates this list.
    #[serde(default)]
    pub image_ids: Vec<String>,
    /// Epoch seconds of the last successful fetch; `None` if never fetched.
    #[serde(default)]
    pub fetched_at: Option<u64>,
}

impl AlbumEntry {
    /// A never-fetched entry with empty fields.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: String::new(),
            description: String::new(),
            cover_id: String::new(),
            image_ids: Vec::new(),
            fetched_at: None,
        }
    }

    /// Whether this entry needs a refresh at `now` under the given TTL.
    #[must_use]
    pub fn is_stale(&self, ttl: u64, now: u64) -> bool {
        entry_is_stale(self.fetched_at, ttl, now)
    }
}

/// Cached metadata for one Imgur image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Bare Imgur ID of the image.
    pub id: String,
    /// Image title; empty until fetched.
    #[serde(default)]
    pub title: String,
    /// Image description; empty until fetched.
    #[serde(default)]
    pub description: String,
    /// Width in pixels; 0 until fetched.
    #[serde(default)]
    pub width: u32,
    /// Height in pixels; 0 until fetched.
    #[serde(default)]
    pub height: u32,
    /// MIME type such as `image/jpeg`; empty until fetched.
    #[serde(default)]
    pub mime_type: String,
    /// Epoch seconds of the last successful fetch; `None` if never fetched.
    #[serde(default)]
    pub fetched_at: Option<u64>,
}

impl ImageEntry {
    /// A never-fetched entry with empty fields.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: String::new(),
            description: String::new(),
            width: 0,
            height: 0,
            mime_type: String::new(),
            fetched_at: None,
        }
    }

    /// Whether this entry needs a refresh at `now` under the given TTL.
    #[must_use]
    pub fn is_stale(&self, ttl: u64, now: u64) -> bool {
        entry_is_stale(self.fetched_at, ttl, now)
    }
}

/// A resolved cache entry, borrowed from the store.
///
/// What the rendering collaborator reads after refresh has completed for the
/// current cycle.
#[derive(Debug, Clone, Copy)]
pub enum CacheEntry<'a> {
    /// A cached album.
    Album(&'a AlbumEntry),
    /// A cached image.
    Image(&'a ImageEntry),
}

impl CacheEntry<'_> {
    /// Title of the underlying entry.
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Album(album) => &album.title,
            Self::Image(image) => &image.title,
        }
    }

    /// Description of the underlying entry.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::Album(album) => &album.description,
            Self::Image(image) => &image.description,
        }
    }

    /// Epoch seconds of the last successful fetch, if any.
    #[must_use]
    pub const fn fetched_at(&self) -> Option<u64> {
        match self {
            Self::Album(album) => album.fetched_at,
            Self::Image(image) => image.fetched_at,
        }
    }
}

/// Staleness rule shared by both entry kinds.
///
/// Never-fetched entries are stale regardless of TTL. A fetched entry goes
/// stale once strictly more than `ttl` seconds have elapsed, so an entry
/// refreshed at `T` is still fresh at `T + ttl` and stale at `T + ttl + 1`.
fn entry_is_stale(fetched_at: Option<u64>, ttl: u64, now: u64) -> bool {
    fetched_at.is_none_or(|at| now.saturating_sub(at) > ttl)
}
