use std::future::Future;

use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

use crate::{entities::movie, error::AppResult, models::Movie};

/// The persistence operations the catalog needs, and nothing more.
pub trait MovieStore: Clone + Send + Sync + 'static {
    /// Full scan. Lazy: rows are fetched as the stream is polled, and every
    /// call starts a fresh scan.
    fn find_all(&self) -> BoxStream<'static, AppResult<Movie>>;

    fn find_by_id(&self, id: &str) -> impl Future<Output = AppResult<Option<Movie>>> + Send;

    fn find_by_title(&self, title: &str) -> impl Future<Output = AppResult<Vec<Movie>>> + Send;

    fn insert(&self, movie: Movie) -> impl Future<Output = AppResult<Movie>> + Send;

    /// Returns the number of removed movies.
    fn delete_all(&self) -> impl Future<Output = AppResult<u64>> + Send;
}

#[derive(Clone)]
pub struct SqlMovieStore {
    db: DatabaseConnection,
    page_size: u64,
}

impl SqlMovieStore {
    pub fn new(db: DatabaseConnection, page_size: u64) -> Self {
        Self { db, page_size: page_size.max(1) }
    }
}

impl MovieStore for SqlMovieStore {
    fn find_all(&self) -> BoxStream<'static, AppResult<Movie>> {
        let db = self.db.clone();
        let page_size = self.page_size;

        // State is (last id seen, exhausted). Paging by key keeps rows inserted
        // mid-scan from shifting later pages.
        futures::stream::try_unfold((None::<String>, false), move |(after, exhausted)| {
            let db = db.clone();
            async move {
                if exhausted {
                    return AppResult::Ok(None);
                }
                let rows = scan_page(&db, after.as_deref(), page_size).await?;
                let exhausted = (rows.len() as u64) < page_size;
                let last = rows.last().map(|m| m.id.clone()).or(after);
                Ok(Some((rows, (last, exhausted))))
            }
        })
        .map_ok(|rows| futures::stream::iter(rows.into_iter().map(AppResult::Ok)))
        .try_flatten()
        .boxed()
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Movie>> {
        let found = movie::Entity::find_by_id(id.to_string()).one(&self.db).await?;
        Ok(found.map(Movie::from))
    }

    async fn find_by_title(&self, title: &str) -> AppResult<Vec<Movie>> {
        let rows = movie::Entity::find()
            .filter(movie::Column::Title.eq(title))
            .order_by_asc(movie::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Movie::from).collect())
    }

    async fn insert(&self, movie: Movie) -> AppResult<Movie> {
        let model =
            movie::ActiveModel { id: Set(movie.id.clone()), title: Set(movie.title.clone()) };
        movie::Entity::insert(model).exec_without_returning(&self.db).await?;
        Ok(movie)
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let res = movie::Entity::delete_many().exec(&self.db).await?;
        Ok(res.rows_affected)
    }
}

async fn scan_page(
    db: &DatabaseConnection,
    after: Option<&str>,
    limit: u64,
) -> AppResult<Vec<Movie>> {
    let mut query = movie::Entity::find();
    if let Some(after) = after {
        query = query.filter(movie::Column::Id.gt(after));
    }
    let rows = query.order_by_asc(movie::Column::Id).limit(limit).all(db).await?;
    tracing::trace!(after = ?after, fetched = rows.len(), "scanned movie page");
    Ok(rows.into_iter().map(Movie::from).collect())
}
