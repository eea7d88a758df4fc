//! Axum handlers.

use super::error::ApiError;
use super::AppState;
use crate::document::{Language, UploadedDocument};
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// JSON alternative to the multipart upload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Base64Upload {
    /// Raw base64 or a `data:<mime>;base64,` URL.
    pub document_base64: Option<String>,
    pub media_type: Option<String>,
    pub language_preference: Option<String>,
    pub filename: Option<String>,
}

impl Base64Upload {
    fn into_document(self) -> Result<(UploadedDocument, Language), ApiError> {
        let encoded = self
            .document_base64
            .filter(|s| !s.trim().is_empty())
            .ok_or(ApiError::MissingFile)?;

        let (url_media_type, payload) = split_data_url(encoded.trim());
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| ApiError::BadRequest(format!("documentBase64 is not valid base64: {e}")))?;

        let media_type = self
            .media_type
            .or(url_media_type)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let language = Language::from_preference(self.language_preference.as_deref());
        Ok((UploadedDocument::new(bytes, media_type, self.filename), language))
    }
}

/// Split `data:<mime>;base64,<payload>` into its media type and payload.
fn split_data_url(s: &str) -> (Option<String>, &str) {
    if let Some(rest) = s.strip_prefix("data:") {
        if let Some((meta, payload)) = rest.split_once(',') {
            let mime = meta.trim_end_matches(";base64");
            let mime = (!mime.is_empty()).then(|| mime.to_string());
            return (mime, payload);
        }
    }
    (None, s)
}

/// `POST /api/analyze-and-summarize`
///
/// Accepts `multipart/form-data` (fields `file`, `languagePreference`) or a
/// JSON [`Base64Upload`]. Answers 200 with the success envelope, 500 with
/// the failure envelope, or 4xx when the request carries no usable upload.
pub async fn analyze_and_summarize(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let (document, language) = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        read_multipart(multipart).await?
    } else if content_type.starts_with("application/json") {
        let Json(upload) = Json::<Base64Upload>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        upload.into_document()?
    } else {
        debug!("Unsupported request content type '{}'", content_type);
        return Err(ApiError::MissingFile);
    };

    let limit = state.analyzer.config().max_upload_bytes;
    if document.size() > limit {
        return Err(ApiError::TooLarge {
            size: document.size(),
            limit,
        });
    }

    let result = state.analyzer.run(document, language).await;
    let status = if result.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(result.envelope())).into_response())
}

async fn read_multipart(
    mut multipart: Multipart,
) -> Result<(UploadedDocument, Language), ApiError> {
    let mut document: Option<UploadedDocument> = None;
    let mut preference: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" if document.is_none() => {
                let filename = field.file_name().map(str::to_string);
                let media_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                info!(
                    "Received upload {} ({}, {} bytes)",
                    filename.as_deref().unwrap_or("<unnamed>"),
                    media_type,
                    bytes.len()
                );
                if bytes.is_empty() {
                    return Err(ApiError::MissingFile);
                }
                document = Some(UploadedDocument::new(bytes.to_vec(), media_type, filename));
            }
            "languagePreference" => {
                preference = Some(field.text().await?);
            }
            _ => {}
        }
    }

    let document = document.ok_or(ApiError::MissingFile)?;
    Ok((document, Language::from_preference(preference.as_deref())))
}

/// Any other method on the analysis route.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// `GET /api/health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /api/env-check`
pub async fn env_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "OPENAI_API_KEY_present": state.analyzer.has_provider(),
        "pdf_engine_available": state.analyzer.pdf_capability().is_available(),
    }))
}
