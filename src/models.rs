use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::entities::movie;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: String,
    pub title: String,
}

impl Movie {
    /// Builds a movie with a fresh random id.
    pub fn new(title: impl Into<String>) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), title: title.into() }
    }
}

impl From<movie::Model> for Movie {
    fn from(model: movie::Model) -> Self {
        Self { id: model.id, title: model.title }
    }
}

/// A synthetic "someone viewed this movie" notification. Never persisted.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieEvent {
    pub movie_id: String,
    pub date_viewed: Timestamp,
}

impl MovieEvent {
    pub fn now(movie_id: &str) -> Self {
        Self { movie_id: movie_id.to_string(), date_viewed: Timestamp::now() }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MoviesQuery {
    pub title: Option<String>,
}
