//! One build cycle's view of the cache.
//!
//! A [`BuildSession`] ties the pieces together for the host build system:
//! it loads the persisted snapshot, accumulates the IDs discovered while
//! documents are read, refreshes what is stale, answers render-time lookups,
//! and persists the result. Parallel builds run one session per worker and
//! fold the workers back into the coordinator with
//! [`merge_worker`](BuildSession::merge_worker).

use chrono::Utc;

use crate::client::ImgurClient;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::refresh::{RefreshSummary, refresh_cache};
use crate::storage::Storage;
use crate::store::MetadataCache;
use crate::types::{CacheEntry, DocumentRefs, ImgurRef};

/// Current time as epoch seconds.
///
/// A pre-1970 system clock degrades to 0, which marks every fetched entry
/// stale rather than panicking mid-build.
fn epoch_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

/// Cache lifecycle for one build, from snapshot load to snapshot save.
#[derive(Debug)]
pub struct BuildSession {
    config: CacheConfig,
    storage: Storage,
    client: ImgurClient,
    cache: MetadataCache,
    refs: DocumentRefs,
}

impl BuildSession {
    /// Start a session against the default storage location.
    ///
    /// # Errors
    ///
    /// Returns an error when the data directory cannot be resolved or the
    /// configuration cannot drive a refresh (bad `client_id`).
    pub fn begin(config: CacheConfig) -> Result<Self> {
        let storage = Storage::new()?;
        Self::begin_with_storage(config, storage)
    }

    /// Start a session against explicit storage (workers, tests).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for an invalid
    /// credential or API URL.
    pub fn begin_with_storage(config: CacheConfig, storage: Storage) -> Result<Self> {
        let client = ImgurClient::with_base_url(&config.client_id, &config.api_url)?;
        let cache = storage.load_cache();
        Ok(Self {
            config,
            storage,
            client,
            cache,
            refs: DocumentRefs::new(),
        })
    }

    /// Record one reference discovered in a document.
    ///
    /// The entry is created immediately (never-fetched) so later lookups and
    /// the refresh whitelist both see it.
    pub fn note_ref(&mut self, imgur_ref: &ImgurRef) {
        self.refs.insert(imgur_ref);
        match imgur_ref {
            ImgurRef::Album(id) => {
                self.cache.ensure_album(id);
            },
            ImgurRef::Image(id) => {
                self.cache.ensure_image(id);
            },
        }
    }

    /// Record a whole document's worth of references.
    pub fn note_refs(&mut self, refs: &DocumentRefs) {
        self.refs.extend(refs);
        self.cache.ensure_present(refs);
    }

    /// Every reference noted so far in this session.
    #[must_use]
    pub const fn noted_refs(&self) -> &DocumentRefs {
        &self.refs
    }

    /// Drop cache entries not referenced in this session.
    ///
    /// Only meaningful after **all** documents have been noted; call it on
    /// full builds, not incremental ones. Returns the number of entries
    /// removed.
    pub fn prune(&mut self) -> usize {
        self.cache.prune(&self.refs)
    }

    /// Refresh stale entries among the noted references.
    ///
    /// When nothing was noted (a forced full refresh), every known ID is
    /// fair game. Per-ID failures are logged and skipped; the summary
    /// reports them.
    pub async fn refresh(&mut self) -> RefreshSummary {
        refresh_cache(
            &mut self.cache,
            &self.client,
            &self.refs,
            self.config.ttl,
            epoch_now(),
        )
        .await
    }

    /// Render-time lookup of a cached entry.
    #[must_use]
    pub fn resolve(&self, imgur_ref: &ImgurRef) -> Option<CacheEntry<'_>> {
        self.cache.resolve(imgur_ref)
    }

    /// Fold a finished worker's cache into this coordinator session.
    ///
    /// Fresher fetches win per entry, so the merged cache is the same no
    /// matter what order workers finish in.
    pub fn merge_worker(&mut self, worker: MetadataCache) {
        self.cache.merge(worker);
    }

    /// The session's current cache contents.
    #[must_use]
    pub const fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Persist the cache snapshot and end the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) when the snapshot
    /// cannot be written; the in-memory cache is returned to the caller
    /// either way via [`into_cache`](Self::into_cache) semantics on success.
    pub fn finish(self) -> Result<MetadataCache> {
        self.storage.save_cache(&self.cache)?;
        Ok(self.cache)
    }

    /// End the session without persisting (worker sessions hand their cache
    /// to the coordinator instead).
    #[must_use]
    pub fn into_cache(self) -> MetadataCache {
        self.cache
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> CacheConfig {
        let mut config = CacheConfig::new("13d3c73555f2190");
        config.api_url = server.uri();
        config.ttl = 60;
        config
    }

    fn session_for(server: &MockServer, dir: &tempfile::TempDir) -> BuildSession {
        let storage = Storage::with_root(dir.path().to_path_buf()).expect("storage");
        BuildSession::begin_with_storage(config_for(server), storage).expect("session")
    }

    async fn mount_fixture(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/album/V76cJ"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "title": "2010 JSW, 2012 Projects", "description": "Cars.",
                    "cover": "mGQBV",
                    "images": [{"id": "mGQBV", "title": "Charging", "description": null,
                                "width": 2560, "height": 1920, "type": "image/jpeg"}]
                }
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/image/hiX02"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"id": "hiX02", "title": "Work", "description": "Bench.",
                         "width": 3264, "height": 2448, "type": "image/jpeg"}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn full_cycle_persists_across_sessions() {
        let server = MockServer::start().await;
        mount_fixture(&server).await;
        let dir = tempfile::tempdir().expect("tempdir");

        let mut session = session_for(&server, &dir);
        session.note_ref(&ImgurRef::parse("a/V76cJ"));
        session.note_ref(&ImgurRef::parse("hiX02"));
        let summary = session.refresh().await;
        assert_eq!((summary.albums_fetched, summary.images_fetched), (1, 1));

        let entry = session.resolve(&ImgurRef::parse("hiX02")).expect("entry");
        assert_eq!(entry.title(), "Work");
        session.finish().expect("save");

        // A second session loads everything fresh and issues no requests.
        let mut session = session_for(&server, &dir);
        session.note_ref(&ImgurRef::parse("a/V76cJ"));
        session.note_ref(&ImgurRef::parse("hiX02"));
        let summary = session.refresh().await;
        assert_eq!(summary, RefreshSummary::default());
        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 2, "only the first session hit the API");
        assert!(
            session
                .resolve(&ImgurRef::parse("mGQBV"))
                .is_some(),
            "album member survived the round trip"
        );
    }

    #[tokio::test]
    async fn prune_uses_the_noted_references() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().expect("tempdir");

        let mut session = session_for(&server, &dir);
        session.note_refs(&DocumentRefs {
            albums: ["V76cJ".to_string()].into(),
            images: ["hiX02".to_string(), "Pwx1G5j".to_string()].into(),
        });
        let saved = session.finish().expect("save");
        assert_eq!(saved.len(), 3);

        // Next build only mentions one image.
        let mut session = session_for(&server, &dir);
        session.note_ref(&ImgurRef::parse("hiX02"));
        assert_eq!(session.prune(), 2);
        assert_eq!(session.cache().len(), 1);
    }

    #[tokio::test]
    async fn worker_merge_keeps_the_fresher_fetch() {
        let server = MockServer::start().await;
        mount_fixture(&server).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let worker_dir = tempfile::tempdir().expect("tempdir");

        let mut worker = session_for(&server, &worker_dir);
        worker.note_ref(&ImgurRef::parse("hiX02"));
        worker.refresh().await;

        let mut coordinator = session_for(&server, &dir);
        coordinator.note_ref(&ImgurRef::parse("hiX02"));
        coordinator.merge_worker(worker.into_cache());

        // The worker's fetched copy beats the coordinator's never-fetched
        // placeholder, so nothing is stale anymore.
        let summary = coordinator.refresh().await;
        assert_eq!(summary, RefreshSummary::default());
        assert_eq!(
            coordinator
                .resolve(&ImgurRef::parse("hiX02"))
                .expect("entry")
                .title(),
            "Work"
        );
    }

    #[tokio::test]
    async fn bad_credential_stops_the_session_up_front() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::with_root(dir.path().to_path_buf()).expect("storage");
        let config = CacheConfig::new("NOT-A-CREDENTIAL");
        let err = BuildSession::begin_with_storage(config, storage).unwrap_err();
        assert_eq!(err.category(), "config");
    }
}
