//! Route handlers. Each one is a thin adapter over [`Mailbox`], run on the
//! blocking thread pool.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::base_url::base_url;
use super::error::ApiError;
use super::AppState;
use crate::error::{MailsinkError, Result};
use crate::model::attachment::{Attachment, AttachmentInfo};
use crate::model::html::HtmlNode;
use crate::model::mail::MailSummary;
use crate::service::Mailbox;

type ApiResult<T> = std::result::Result<T, ApiError>;

const TEXT_PLAIN: &str = "text/plain;charset=UTF-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub xpath: String,
}

/// Run `work` against the mailbox on the blocking thread pool.
async fn blocking<T, F>(state: &AppState, work: F) -> ApiResult<T>
where
    F: FnOnce(&Mailbox) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let mailbox = Arc::clone(&state.mailbox);
    let result = tokio::task::spawn_blocking(move || work(&mailbox))
        .await
        .map_err(|e| MailsinkError::Task(e.to_string()))?;
    Ok(result?)
}

// ── Mails ───────────────────────────────────────────────────────

pub async fn list_mails(State(state): State<AppState>) -> ApiResult<Json<Vec<MailSummary>>> {
    Ok(Json(blocking(&state, |mailbox| mailbox.list()).await?))
}

pub async fn ingest_mail(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let id = blocking(&state, move |mailbox| mailbox.ingest(&body)).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

pub async fn get_mail(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<MailSummary>> {
    Ok(Json(blocking(&state, move |mailbox| mailbox.summary(id)).await?))
}

pub async fn get_source(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Response> {
    let source = blocking(&state, move |mailbox| mailbox.source(id)).await?;
    Ok(([(CONTENT_TYPE, TEXT_PLAIN)], source).into_response())
}

pub async fn get_text(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Response> {
    let text = blocking(&state, move |mailbox| mailbox.text(id)).await?;
    Ok(([(CONTENT_TYPE, TEXT_PLAIN)], text).into_response())
}

// ── HTML ────────────────────────────────────────────────────────

pub async fn get_html(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let base = base_url(&headers, state.public_url.as_deref());
    let html = blocking(&state, move |mailbox| mailbox.html(id, &base)).await?;
    Ok(([(CONTENT_TYPE, TEXT_HTML)], html).into_response())
}

pub async fn get_content(
    State(state): State<AppState>,
    Path((id, content_id)): Path<(u64, String)>,
) -> ApiResult<Response> {
    let attachment = blocking(&state, move |mailbox| mailbox.content(id, &content_id)).await?;
    Ok(attachment_response(attachment))
}

pub async fn query_html(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<Vec<HtmlNode>>> {
    let nodes = blocking(&state, move |mailbox| mailbox.query(id, &request.xpath)).await?;
    Ok(Json(nodes))
}

// ── Attachments ─────────────────────────────────────────────────

pub async fn list_attachments(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Vec<AttachmentInfo>>> {
    Ok(Json(blocking(&state, move |mailbox| mailbox.attachments(id)).await?))
}

pub async fn get_attachment(
    State(state): State<AppState>,
    Path((id, index)): Path<(u64, usize)>,
) -> ApiResult<Response> {
    let attachment = blocking(&state, move |mailbox| mailbox.attachment(id, index)).await?;
    Ok(attachment_response(attachment))
}

// ── Maintenance ─────────────────────────────────────────────────

pub async fn purge(State(state): State<AppState>) -> ApiResult<StatusCode> {
    blocking(&state, |mailbox| mailbox.purge()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_mail(State(state): State<AppState>) -> ApiResult<StatusCode> {
    blocking(&state, |mailbox| mailbox.create_demo_mail()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Raw attachment bytes. `Content-Disposition` carries the bare filename and
/// is left out when the part had none or it is not a valid header value.
fn attachment_response(attachment: Attachment) -> Response {
    let mut headers = HeaderMap::new();
    let content_type = HeaderValue::from_str(&attachment.content_type())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(CONTENT_TYPE, content_type);
    if !attachment.filename.is_empty() {
        if let Ok(value) = HeaderValue::from_bytes(attachment.filename.as_bytes()) {
            headers.insert(CONTENT_DISPOSITION, value);
        }
    }
    (headers, attachment.data).into_response()
}
