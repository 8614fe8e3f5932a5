use tracing::info;

use crate::{catalog::CatalogService, error::AppResult, models::Movie, store::MovieStore};

pub const SAMPLE_TITLES: [&str; 3] = ["Yemmaya Chesave", "Guru", "hmm"];

/// Wipes the catalog and inserts the sample movies. Consumed by `run`, so it
/// can only ever run once.
pub struct Seeder<S> {
    catalog: CatalogService<S>,
}

impl<S: MovieStore> Seeder<S> {
    pub fn new(catalog: CatalogService<S>) -> Self {
        Self { catalog }
    }

    pub async fn run(self) -> AppResult<Vec<Movie>> {
        self.catalog.delete_all().await?;

        let mut inserted = Vec::with_capacity(SAMPLE_TITLES.len());
        for title in SAMPLE_TITLES {
            let movie = self.catalog.insert(Movie::new(title)).await?;
            info!(id = %movie.id, title = %movie.title, "seeded movie");
            inserted.push(movie);
        }

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, time::Duration};

    use futures::TryStreamExt;

    use super::*;
    use crate::store::tests::memory_store;

    #[tokio::test]
    async fn seeding_replaces_existing_movies() {
        let catalog = CatalogService::new(memory_store(10).await, Duration::from_secs(1));
        let stale = catalog.insert(Movie::new("stale")).await.unwrap();

        let seeded = Seeder::new(catalog.clone()).run().await.unwrap();
        assert_eq!(seeded.len(), 3);

        let all: Vec<Movie> = catalog.list_all().try_collect().await.unwrap();
        let titles: HashSet<_> = all.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, HashSet::from(SAMPLE_TITLES));

        let ids: HashSet<_> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(stale.id.as_str()));
    }
}
