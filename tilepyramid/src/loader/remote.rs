//! Tile server worker.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::http::HttpClient;
use super::{drain_queue, storage_path, tile_url, LoaderContext};
use crate::coord::TileId;
use crate::map::MapDescriptor;
use crate::tile::TileState;

/// Result of one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// HTTP 200 with a decodable image.
    Fetched,
    /// The server does not have the tile; it will not be requested again.
    Absent,
    /// Transport failure; the tile stays retryable.
    Failed,
}

/// Fetches tiles over HTTP and persists them to the local cache.
pub struct RemoteLoader {
    context: Arc<LoaderContext>,
    http: Arc<dyn HttpClient>,
    base_url: String,
}

impl RemoteLoader {
    /// `base_url` is the server root, e.g. `http://localhost:8080`.
    pub fn new(context: Arc<LoaderContext>, http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            context,
            http,
            base_url: base_url.into(),
        }
    }

    /// Runs the worker loop until the remote queue closes or `token` fires.
    pub fn run(&self, token: CancellationToken) {
        drain_queue(&self.context.remote_queue, &token, |id| {
            self.fetch(id);
        });
    }

    /// Requests one tile from the server and records the outcome.
    pub fn fetch(&self, id: TileId) -> RemoteOutcome {
        let ctx = &self.context;
        let Some(map) = ctx.maps.get(id.map_id) else {
            debug!(tile = %id, "Skipping tile of unknown map");
            return RemoteOutcome::Failed;
        };

        let url = tile_url(&self.base_url, map, &id);
        let response = match self.http.get(&url) {
            Ok(response) => response,
            Err(e) => {
                // no retry counter: the next resolve pass re-enqueues the tile
                ctx.metrics.remote_error();
                debug!(tile = %id, error = %e, "Tile fetch failed");
                return RemoteOutcome::Failed;
            }
        };

        if !response.is_ok() {
            debug!(tile = %id, status = response.status, "Tile absent on server");
            self.mark_absent(id);
            return RemoteOutcome::Absent;
        }

        match ctx.codec.decode(&response.body) {
            Ok(pixels) => {
                self.persist(map, &id, &response.body);
                ctx.store.put(id, TileState::loaded(pixels));
                ctx.metrics.remote_fetched(response.body.len());
                debug!(tile = %id, bytes = response.body.len(), "Fetched tile");
                ctx.redraw.request_redraw();
                RemoteOutcome::Fetched
            }
            Err(e) => {
                warn!(tile = %id, error = %e, "Undecodable tile body, treating tile as absent");
                self.mark_absent(id);
                RemoteOutcome::Absent
            }
        }
    }

    fn mark_absent(&self, id: TileId) {
        let ctx = &self.context;
        ctx.store.put(id, TileState::confirmed_absent());
        ctx.metrics.remote_absent();
        ctx.redraw.request_redraw();
    }

    /// Writes the raw body where the local loader will look for it.
    /// Failures only cost a future refetch.
    fn persist(&self, map: &MapDescriptor, id: &TileId, body: &[u8]) {
        let path = storage_path(&self.context.cache_root, map, id);
        let result = match path.parent() {
            Some(parent) => std::fs::create_dir_all(parent).and_then(|_| std::fs::write(&path, body)),
            None => std::fs::write(&path, body),
        };
        if let Err(e) = result {
            warn!(tile = %id, path = %path.display(), error = %e, "Failed to persist tile");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fixtures::{context, png, MAP};
    use crate::loader::http::tests::MockHttpClient;
    use crate::loader::{FetchError, HttpResponse};
    use crate::tile::TileLevel;
    use tempfile::TempDir;

    fn loader(ctx: &Arc<LoaderContext>, response: Result<HttpResponse, FetchError>) -> (RemoteLoader, Arc<MockHttpClient>) {
        let http = Arc::new(MockHttpClient::new(response));
        let loader = RemoteLoader::new(ctx.clone(), http.clone(), "http://tiles.test:8080");
        (loader, http)
    }

    #[test]
    fn test_fetched_tile_is_stored_and_persisted() {
        let dir = TempDir::new().unwrap();
        let (ctx, redraw) = context(dir.path(), false);
        let body = png(90);
        let (loader, http) = loader(&ctx, Ok(HttpResponse::new(200, body.clone())));
        let id = TileId::new(MAP, 6, 10, 20);

        assert_eq!(loader.fetch(id), RemoteOutcome::Fetched);

        assert_eq!(
            *http.requests.lock(),
            vec!["http://tiles.test:8080/maps/gettile?map=osm&z=6&x=10&y=20".to_string()]
        );
        let state = ctx.store.get(&id).unwrap();
        assert_eq!(state.level, TileLevel::Loaded);
        assert!(state.ready());

        let persisted = storage_path(dir.path(), ctx.maps.get(MAP).unwrap(), &id);
        assert_eq!(std::fs::read(persisted).unwrap(), body);
        assert_eq!(redraw.count(), 1);
        assert_eq!(ctx.metrics.snapshot(0).remote_fetched, 1);
    }

    #[test]
    fn test_not_found_settles_absent() {
        let dir = TempDir::new().unwrap();
        let (ctx, _) = context(dir.path(), false);
        let (loader, _) = loader(&ctx, Ok(HttpResponse::new(404, Vec::new())));
        let id = TileId::new(MAP, 6, 10, 20);

        assert_eq!(loader.fetch(id), RemoteOutcome::Absent);

        let state = ctx.store.get(&id).unwrap();
        assert_eq!(state.level, TileLevel::ConfirmedAbsent);
        assert!(!state.needs_load);
        assert!(state.needs_build);
    }

    #[test]
    fn test_undecodable_body_is_absent_and_not_persisted() {
        let dir = TempDir::new().unwrap();
        let (ctx, _) = context(dir.path(), false);
        let (loader, _) = loader(&ctx, Ok(HttpResponse::new(200, b"<html>oops</html>".to_vec())));
        let id = TileId::new(MAP, 6, 10, 20);

        assert_eq!(loader.fetch(id), RemoteOutcome::Absent);
        assert_eq!(ctx.store.get(&id).unwrap().level, TileLevel::ConfirmedAbsent);
        assert!(!storage_path(dir.path(), ctx.maps.get(MAP).unwrap(), &id).exists());
    }

    #[test]
    fn test_transport_error_leaves_store_untouched() {
        let dir = TempDir::new().unwrap();
        let (ctx, redraw) = context(dir.path(), false);
        let error = FetchError::Request {
            url: "http://tiles.test".to_string(),
            message: "connection refused".to_string(),
        };
        let (loader, _) = loader(&ctx, Err(error));
        let id = TileId::new(MAP, 6, 10, 20);

        assert_eq!(loader.fetch(id), RemoteOutcome::Failed);
        assert!(ctx.store.get(&id).is_none());
        assert_eq!(redraw.count(), 0);
        assert_eq!(ctx.metrics.snapshot(0).remote_errors, 1);
    }

    #[test]
    fn test_worker_exits_on_close() {
        let dir = TempDir::new().unwrap();
        let (ctx, _) = context(dir.path(), false);
        let (loader, _) = loader(&ctx, Ok(HttpResponse::new(404, Vec::new())));

        let token = CancellationToken::new();
        let worker = {
            let token = token.clone();
            std::thread::spawn(move || loader.run(token))
        };

        token.cancel();
        ctx.remote_queue.close();
        worker.join().unwrap();
    }
}
