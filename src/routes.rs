use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::get,
};
use futures::{Stream, StreamExt, TryStreamExt, stream::BoxStream};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    AppState,
    error::{AppError, AppResult},
    models::{Movie, MovieEvent, MoviesQuery},
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/movies", get(list_movies))
        .route("/movies/{id}", get(get_movie))
        .route("/movie/{id}", get(get_movie))
        .route("/movie/{id}/events", get(movie_events))
        .route("/web/ping", get(ping))
        .route("/web/movies", get(web_movies))
        .route("/web/movie/{id}", get(get_movie))
        .route("/web/movie/{id}/events", get(movie_events))
        .with_state(state)
}

pub async fn ping() -> &'static str {
    "Ping Success!!!"
}

/// All movies, either as a streamed JSON array or, when the client asks for
/// `text/event-stream`, as one SSE frame per movie.
pub async fn list_movies(
    State(state): State<Arc<AppState>>,
    Query(q): Query<MoviesQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let movies = movie_stream(&state, q.title).await?;

    if wants_event_stream(&headers) {
        return Ok(sse_movies(movies));
    }

    let body = Body::from_stream(json_array(movies));
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Controller flavour of the listing: always server-sent events.
pub async fn web_movies(
    State(state): State<Arc<AppState>>,
    Query(q): Query<MoviesQuery>,
) -> AppResult<Response> {
    let movies = movie_stream(&state, q.title).await?;
    Ok(sse_movies(movies))
}

/// Pulls the first movie before any response is built, so a store that is
/// down yields an error status instead of a truncated 200.
async fn movie_stream(
    state: &AppState,
    title: Option<String>,
) -> AppResult<BoxStream<'static, AppResult<Movie>>> {
    let mut movies: BoxStream<'static, AppResult<Movie>> = match title {
        Some(title) => {
            let found = state.catalog.find_by_title(&title).await?;
            debug!(title = %title, found = found.len(), "filtered movies by title");
            futures::stream::iter(found.into_iter().map(AppResult::Ok)).boxed()
        },
        None => state.catalog.list_all(),
    };

    let first = movies.try_next().await?;
    Ok(futures::stream::iter(first.map(AppResult::Ok))
        .chain(movies)
        .inspect_err(|err| warn!(error = %err, "movie stream aborted"))
        .boxed())
}

fn sse_movies(movies: BoxStream<'static, AppResult<Movie>>) -> Response {
    Sse::new(movies.and_then(|movie| async move { sse_event(&movie) })).into_response()
}

pub async fn get_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    match state.catalog.find_by_id(&id).await? {
        Some(movie) => Ok(Json(movie).into_response()),
        None => {
            debug!(id = %id, "movie not found");
            Ok(StatusCode::NOT_FOUND.into_response())
        },
    }
}

pub async fn movie_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = AppResult<Event>>> {
    Sse::new(state.catalog.events(&id).map(|event: MovieEvent| sse_event(&event)))
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

fn sse_event<T: Serialize>(value: &T) -> AppResult<Event> {
    Event::default().json_data(value).map_err(|err| AppError::Other(err.into()))
}

/// Frames a stream of movies as a JSON array, one chunk per element.
fn json_array(
    movies: impl Stream<Item = AppResult<Movie>> + Send + 'static,
) -> impl Stream<Item = AppResult<String>> + Send + 'static {
    let mut first = true;
    let elements = movies.map(move |movie| {
        let sep = if std::mem::take(&mut first) { "" } else { "," };
        Ok::<_, AppError>(format!("{sep}{}", serde_json::to_string(&movie?)?))
    });

    futures::stream::once(async { Ok("[".to_string()) })
        .chain(elements)
        .chain(futures::stream::once(async { Ok("]".to_string()) }))
}
