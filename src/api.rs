use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tracing::error;

use crate::db::SentimentStore;
use crate::error::ApiError;
use crate::models::{DateWindow, PhraseSentiment, Snapshot};
use crate::refresh::SnapshotCell;
use crate::sentiment;
use crate::watchlist::{self, PhraseChange};

pub const DATE_FORMAT: &str = "%d-%m-%Y";
const ADD_PHRASE_HINT: &str = r#"Invalid request: send {"phrase": "ibm"}"#;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SentimentStore>,
    pub snapshot: Arc<SnapshotCell>,
}

#[derive(Debug, Serialize)]
pub struct PhraseOutcome {
    pub phrase: String,
    pub status: PhraseChange,
}

/// API routes, plus the frontend's files from `static_dir` for every other path.
pub fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let mut routes = Router::new()
        .route("/sentiment", get(current_sentiment).post(add_phrase))
        .route("/sentiment/:phrase/:start/:end", get(sentiment_for_range))
        .route("/sentiment/:phrase", delete(remove_phrase));

    if let Some(dir) = static_dir {
        routes = routes.fallback_service(ServeDir::new(dir));
    }

    catch_panics(routes.with_state(state))
}

/// A panicking handler answers 500 instead of dropping the connection.
pub fn catch_panics(router: Router) -> Router {
    router.layer(CatchPanicLayer::custom(panic_response))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(text) = panic.downcast_ref::<String>() {
        text.as_str()
    } else if let Some(text) = panic.downcast_ref::<&str>() {
        text
    } else {
        "unknown panic"
    };
    error!("request handler panicked: {}", message);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

async fn current_sentiment(State(state): State<AppState>) -> Json<Arc<Snapshot>> {
    Json(state.snapshot.current())
}

pub fn parse_day(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| ApiError::BadRequest(format!("Invalid date {raw:?}: expected DD-MM-YYYY")))
}

async fn sentiment_for_range(
    State(state): State<AppState>,
    Path((phrase, start, end)): Path<(String, String, String)>,
) -> Result<Json<PhraseSentiment>, ApiError> {
    let window = DateWindow::days(parse_day(&start)?, parse_day(&end)?)
        .ok_or_else(|| ApiError::BadRequest("Invalid range: end date is before start date".to_string()))?;
    let result = sentiment::compute_sentiment(state.store.as_ref(), &phrase, window).await?;
    Ok(Json(result))
}

fn phrase_from_body(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("phrase")? {
        Value::String(phrase) if !phrase.trim().is_empty() => Some(phrase.clone()),
        _ => None,
    }
}

async fn add_phrase(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PhraseOutcome>, ApiError> {
    let phrase =
        phrase_from_body(&body).ok_or_else(|| ApiError::BadRequest(ADD_PHRASE_HINT.to_string()))?;
    let status = watchlist::add_phrase(state.store.as_ref(), &phrase).await?;
    Ok(Json(PhraseOutcome { phrase, status }))
}

async fn remove_phrase(
    State(state): State<AppState>,
    Path(phrase): Path<String>,
) -> Result<Json<PhraseOutcome>, ApiError> {
    let status = watchlist::remove_phrase(state.store.as_ref(), &phrase).await?;
    Ok(Json(PhraseOutcome { phrase, status }))
}
