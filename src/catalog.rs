use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{Stream, stream::BoxStream};
use tracing::debug;

use crate::{
    error::AppResult,
    models::{Movie, MovieEvent},
    store::MovieStore,
};

#[derive(Clone)]
pub struct CatalogService<S> {
    store: S,
    event_interval: Duration,
    open_streams: Arc<AtomicUsize>,
}

impl<S: MovieStore> CatalogService<S> {
    pub fn new(store: S, event_interval: Duration) -> Self {
        Self { store, event_interval, open_streams: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn list_all(&self) -> BoxStream<'static, AppResult<Movie>> {
        self.store.find_all()
    }

    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<Movie>> {
        self.store.find_by_id(id).await
    }

    pub async fn find_by_title(&self, title: &str) -> AppResult<Vec<Movie>> {
        self.store.find_by_title(title).await
    }

    pub async fn insert(&self, movie: Movie) -> AppResult<Movie> {
        self.store.insert(movie).await
    }

    pub async fn delete_all(&self) -> AppResult<u64> {
        let removed = self.store.delete_all().await?;
        debug!(removed, "deleted all movies");
        Ok(removed)
    }

    /// Endless stream of view events for `movie_id`, one per interval.
    ///
    /// The id is not looked up. The stream only ends when it is dropped, which
    /// also drops the pending timer.
    pub fn events(&self, movie_id: &str) -> impl Stream<Item = MovieEvent> + Send + use<S> {
        let guard = StreamGuard::open(self.open_streams.clone(), movie_id);
        let interval = self.event_interval;

        futures::stream::unfold(guard, move |guard| async move {
            tokio::time::sleep(interval).await;
            let event = MovieEvent::now(&guard.movie_id);
            Some((event, guard))
        })
    }

    /// Number of event streams currently held by consumers.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::Relaxed)
    }
}

struct StreamGuard {
    movie_id: String,
    open: Arc<AtomicUsize>,
}

impl StreamGuard {
    fn open(open: Arc<AtomicUsize>, movie_id: &str) -> Self {
        let now_open = open.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(movie_id, open_streams = now_open, "event stream opened");
        Self { movie_id: movie_id.to_string(), open }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let now_open = self.open.fetch_sub(1, Ordering::Relaxed) - 1;
        debug!(movie_id = %self.movie_id, open_streams = now_open, "event stream closed");
    }
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, TryStreamExt};

    use super::*;
    use crate::store::tests::memory_store;

    async fn service() -> CatalogService<crate::store::SqlMovieStore> {
        CatalogService::new(memory_store(10).await, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn list_all_after_delete_all_is_empty() {
        let catalog = service().await;
        catalog.insert(Movie::new("Guru")).await.unwrap();
        catalog.insert(Movie::new("hmm")).await.unwrap();

        assert_eq!(catalog.delete_all().await.unwrap(), 2);
        let all: Vec<Movie> = catalog.list_all().try_collect().await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn find_by_id_returns_none_for_unknown_id() {
        let catalog = service().await;
        let movie = catalog.insert(Movie::new("Guru")).await.unwrap();

        assert_eq!(catalog.find_by_id(&movie.id).await.unwrap(), Some(movie));
        assert_eq!(catalog.find_by_id("nope").await.unwrap(), None);
    }

    // The clock is paused only after the store is connected so pool timeouts
    // are not auto-advanced.
    #[tokio::test]
    async fn events_tick_once_per_interval_with_same_id() {
        let catalog = service().await;
        tokio::time::pause();
        let start = tokio::time::Instant::now();

        let events: Vec<MovieEvent> = catalog.events("some-id").take(3).collect().await;

        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.movie_id == "some-id"));
        assert!(events.windows(2).all(|w| w[0].date_viewed <= w[1].date_viewed));
        // tokio rounds each sleep deadline up to the next millisecond.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(3) + Duration::from_millis(10), "{elapsed:?}");
    }

    #[tokio::test]
    async fn nothing_is_emitted_before_the_first_interval() {
        let catalog = service().await;
        tokio::time::pause();
        let mut events = Box::pin(catalog.events("x"));

        let early = tokio::time::timeout(Duration::from_millis(999), events.next()).await;
        assert!(early.is_err());

        let event = events.next().await.unwrap();
        assert_eq!(event.movie_id, "x");
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_it() {
        let catalog = service().await;
        tokio::time::pause();
        assert_eq!(catalog.open_streams(), 0);

        let mut a = Box::pin(catalog.events("a"));
        let b = catalog.events("b");
        assert_eq!(catalog.open_streams(), 2);

        a.next().await.unwrap();
        drop(a);
        assert_eq!(catalog.open_streams(), 1);

        drop(b);
        assert_eq!(catalog.open_streams(), 0);
    }
}
