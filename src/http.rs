//! HTTP endpoint: `GET /resize/{slug}?w=&h=`.
//!
//! Artifacts are immutable per URL+validator, so every response carries
//! `Cache-Control: public, max-age=31536000, immutable` plus a strong
//! `ETag` and `Last-Modified`. A request whose `If-None-Match` matches, or
//! whose `If-Modified-Since` is at or after the artifact's mtime, gets an
//! empty `304`.
//!
//! | Outcome | Status |
//! |---|---|
//! | slug without jpg/jpeg/png/webp/gif extension | 404 |
//! | `w`/`h` present but not a number, or above `resize.max_dimension` | 400 |
//! | source missing (and no default image), unreadable image | 404 |
//! | lock timeout, encode failure, IO error | 500 |

use crate::imaging::OutputFormat;
use crate::service::{Artifact, ServiceError, ThumbnailRequest, ThumbnailService};
use crate::source;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

pub const CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Router serving the resize endpoint.
pub fn router(service: Arc<ThumbnailService>) -> Router {
    Router::new()
        .route("/resize/*slug", get(resize))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Default, Deserialize)]
pub struct ResizeQuery {
    pub w: Option<String>,
    pub h: Option<String>,
}

async fn resize(
    State(service): State<Arc<ThumbnailService>>,
    Path(slug): Path<String>,
    Query(query): Query<ResizeQuery>,
    headers: HeaderMap,
) -> Response {
    let supported = source::extension(&slug)
        .and_then(|ext| OutputFormat::from_extension(&ext))
        .is_some();
    if !supported {
        return StatusCode::NOT_FOUND.into_response();
    }

    let (width, height) = match (parse_dimension(query.w.as_deref()), parse_dimension(query.h.as_deref())) {
        (Ok(w), Ok(h)) => (w, h),
        _ => return (StatusCode::BAD_REQUEST, "w and h must be numbers").into_response(),
    };
    let max = service.settings().limits.max_dimension;
    if exceeds(width, max) || exceeds(height, max) {
        let body = format!("w and h must not exceed {max}");
        return (StatusCode::BAD_REQUEST, body).into_response();
    }

    let request = ThumbnailRequest::new(slug, width, height);
    let result = tokio::task::spawn_blocking(move || service.ensure(&request)).await;
    match result {
        Ok(Ok(artifact)) => artifact_response(&artifact, &headers).await,
        Ok(Err(e)) => error_response(&e),
        Err(e) => {
            error!(error = %e, "thumbnail worker panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Blank means absent; anything else must be a finite number.
fn parse_dimension(value: Option<&str>) -> Result<Option<f64>, ()> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or(()),
    }
}

fn exceeds(value: Option<f64>, max: u32) -> bool {
    value.is_some_and(|v| v.round() > max as f64)
}

fn error_response(e: &ServiceError) -> Response {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!(error = %e, "thumbnail request failed");
    }
    let body = status.canonical_reason().unwrap_or("Error");
    (status, body).into_response()
}

async fn artifact_response(artifact: &Artifact, request_headers: &HeaderMap) -> Response {
    let etag = format!("\"{}\"", artifact.etag);
    let last_modified = http_date(artifact.modified);
    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    if let Ok(v) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, v);
    }
    if let Ok(v) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, v);
    }

    if is_not_modified(request_headers, &etag, artifact.modified) {
        return (StatusCode::NOT_MODIFIED, headers).into_response();
    }

    let bytes = match tokio::fs::read(&artifact.path).await {
        Ok(b) => b,
        Err(e) => {
            warn!(path = %artifact.path.display(), error = %e, "failed to read artifact");
            return error_response(&ServiceError::Io(e));
        }
    };
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(artifact.format.mime_type()),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    (StatusCode::OK, headers, Body::from(bytes)).into_response()
}

/// Whether the client's cached copy is still valid.
pub fn is_not_modified(headers: &HeaderMap, etag: &str, modified: SystemTime) -> bool {
    let etag_matches = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.split(',').map(str::trim).any(|candidate| {
                candidate == "*" || candidate.trim_start_matches("W/") == etag
            })
        });
    if etag_matches {
        return true;
    }

    let modified_secs = unix_secs(modified);
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v.trim()).ok())
        .is_some_and(|since| since.timestamp() >= modified_secs)
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn unix_secs(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
