use std::sync::Arc;

use axum::extract::{Query, State};
use axum::{routing, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::dto::image::ImageReference;
use crate::dto::service::DEFAULT_IMAGE_PATTERN;
use crate::dto::PassReport;
use crate::error::AppError;
use crate::resolver::resolve_latest;
use crate::tag::TagPattern;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", routing::get(health))
        .route("/sync", routing::post(sync_post))
        .route("/tags/latest", routing::get(latest_tag_get))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    status: &'static str,
    label_prefix: String,
    interval_secs: Option<u64>,
}

pub async fn health(state: State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        label_prefix: state.config.sync.label_prefix.clone(),
        interval_secs: state.config.sync.interval_secs,
    })
}

/// Run a reconciliation pass now and return its report.
///
/// Responds with `409 Conflict` while another pass is running.
pub async fn sync_post(state: State<Arc<AppState>>) -> Result<Json<PassReport>, AppError> {
    let report = state.run_pass().await?;
    Ok(Json(report))
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestTagParams {
    image: String,
    pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatestTag {
    repository: String,
    pattern: TagPattern,
    tag: String,
    image: String,
}

/// Resolve the newest tag of an image that matches a pattern, without updating anything.
///
/// full endpoint: `/tags/latest?image=<image>&pattern=<pattern>`
pub async fn latest_tag_get(Query(params): Query<LatestTagParams>, state: State<Arc<AppState>>) -> Result<Json<LatestTag>, AppError> {
    let image = ImageReference::parse(&params.image)?;
    let pattern = TagPattern::parse(params.pattern.as_deref().unwrap_or(DEFAULT_IMAGE_PATTERN));

    let tag = resolve_latest(state.registry.as_ref(), &image, &pattern).await?
        .ok_or_else(|| AppError::NoMatch {
            image: image.canonical_name(),
            pattern: pattern.to_string(),
        })?;

    Ok(Json(LatestTag {
        repository: image.canonical_name(),
        image: image.with_tag(&tag).to_string(),
        pattern,
        tag,
    }))
}
