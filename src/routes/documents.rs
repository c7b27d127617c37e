use axum::extract::{Json, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{AppError, AppResult};
use crate::models::Evaluation;
use crate::routes::PageQuery;
use crate::service::{DocumentView, EvaluationView};
use crate::state::AppState;
use crate::storage::object_key;
use crate::workflow::EvaluationInput;

fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    ))
}

#[derive(Deserialize)]
pub struct AssignReviewerRequest {
    pub reviewer_id: Uuid,
}

#[derive(Serialize)]
pub struct DocumentDownloadResponse {
    pub url: String,
    pub expires_in: u64,
}

#[derive(Default)]
struct UploadForm {
    title: Option<String>,
    organization: Option<String>,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Option<Vec<u8>>,
}

async fn read_upload_form(multipart: &mut Multipart) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request("invalid_multipart")
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                form.file_name = field.file_name().map(|n| n.to_string());
                form.content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request("invalid_file")
                })?;
                form.bytes = Some(data.to_vec());
            }
            Some(text_field @ ("title" | "organization")) => {
                let text_field = text_field.to_string();
                let value = field.text().await.map_err(|err| {
                    error!(error = %err, field = %text_field, "invalid text field");
                    AppError::bad_request("invalid_multipart")
                })?;
                if text_field == "title" {
                    form.title = Some(value);
                } else {
                    form.organization = Some(value);
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

pub async fn list_documents(
    State(state): State<AppState>,
    identity: Identity,
    WithRejection(Query(page), _): WithRejection<Query<PageQuery>, AppError>,
) -> AppResult<Json<Vec<DocumentView>>> {
    let documents = state.service.list_documents(&identity, page.into())?;
    Ok(Json(documents))
}

pub async fn upload_document(
    State(state): State<AppState>,
    identity: Identity,
    WithRejection(mut multipart, _): WithRejection<Multipart, AppError>,
) -> AppResult<(StatusCode, Json<DocumentView>)> {
    let form = read_upload_form(&mut multipart).await?;
    let title = form.title.unwrap_or_default();
    let organization = form.organization.unwrap_or_default();

    // reject before any bytes reach object storage
    state.service.check_upload(&identity, &title, &organization)?;

    let bytes = form.bytes.ok_or_else(|| {
        warn!(user_id = %identity.user_id, "upload rejected: missing file field");
        AppError::bad_request("missing_file")
    })?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("empty_file"));
    }
    let file_name = form
        .file_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("missing_filename"))?;

    let content_type = form.content_type.or_else(|| {
        mime_guess::from_path(&file_name)
            .first()
            .map(|mime| mime.to_string())
    });
    let key = object_key(identity.user_id, &file_name);
    let size_bytes = bytes.len();

    state
        .storage
        .put_object(
            &key,
            bytes,
            content_type,
            inline_content_disposition(&file_name),
        )
        .await
        .map_err(|err| {
            error!(error = %err, key = %key, "failed to store document");
            AppError::internal(err)
        })?;

    match state
        .service
        .upload_document(&identity, &title, &organization, &key)
    {
        Ok(document) => {
            info!(
                document_id = %document.id,
                key = %key,
                size_bytes,
                "document upload succeeded"
            );
            Ok((StatusCode::CREATED, Json(document)))
        }
        Err(err) => {
            if let Err(cleanup) = state.storage.delete_object(&key).await {
                warn!(error = %cleanup, key = %key, "failed to remove orphaned upload");
            }
            Err(err.into())
        }
    }
}

pub async fn get_document(
    State(state): State<AppState>,
    identity: Identity,
    WithRejection(Path(document_id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<Json<DocumentView>> {
    let document = state.service.get_document(&identity, document_id)?;
    Ok(Json(document))
}

pub async fn download_document(
    State(state): State<AppState>,
    identity: Identity,
    WithRejection(Path(document_id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<Json<DocumentDownloadResponse>> {
    let document = state.service.visible_document(&identity, document_id)?;
    let expires_in = state.download_url_expiry();
    let url = state
        .storage
        .presign_get_object(&document.storage_ref, expires_in)
        .await?;

    Ok(Json(DocumentDownloadResponse {
        url,
        expires_in: expires_in.as_secs(),
    }))
}

pub async fn list_evaluations(
    State(state): State<AppState>,
    identity: Identity,
    WithRejection(Path(document_id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<Json<Vec<EvaluationView>>> {
    let evaluations = state.service.list_evaluations(&identity, document_id)?;
    Ok(Json(evaluations))
}

pub async fn submit_evaluation(
    State(state): State<AppState>,
    identity: Identity,
    WithRejection(Path(document_id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(payload), _): WithRejection<Json<EvaluationInput>, AppError>,
) -> AppResult<(StatusCode, Json<Evaluation>)> {
    let evaluation = state
        .service
        .submit_evaluation(&identity, document_id, &payload)?;
    Ok((StatusCode::CREATED, Json(evaluation)))
}

pub async fn assign_reviewer(
    State(state): State<AppState>,
    identity: Identity,
    WithRejection(Path(document_id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(payload), _): WithRejection<Json<AssignReviewerRequest>, AppError>,
) -> AppResult<Json<DocumentView>> {
    let document = state
        .service
        .assign_reviewer(&identity, document_id, payload.reviewer_id)?;
    Ok(Json(document))
}

pub async fn unassign_reviewer(
    State(state): State<AppState>,
    identity: Identity,
    WithRejection(Path(document_id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<Json<DocumentView>> {
    let document = state.service.unassign_reviewer(&identity, document_id)?;
    Ok(Json(document))
}
