use crate::api::error::AppError;
use crate::services::progress::ProgressUpdate;
use crate::services::upload::UploadCoordinator;
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::io;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub file_url: String,
    pub key: String,
    pub session_id: String,
    pub size: u64,
    pub parts: usize,
}

#[derive(Deserialize)]
pub struct UploadParams {
    /// Session id to report progress under. Clients that subscribe
    /// before uploading pass the same id to both endpoints; otherwise
    /// one is generated.
    pub session: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct DeleteRequest {
    pub key: String,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[utoipa::path(
    post,
    path = "/api/files",
    request_body(content = Vec<u8>, description = "multipart/form-data with a `file` field", content_type = "multipart/form-data"),
    params(
        ("session" = Option<String>, Query, description = "Progress session id")
    ),
    responses(
        (status = 200, description = "Object committed", body = UploadResponse),
        (status = 400, description = "Malformed upload"),
        (status = 502, description = "Object store failure")
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<crate::AppState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let session_id = params
        .session
        .unwrap_or_else(UploadCoordinator::new_session_id);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(|n| n.to_string())
            .ok_or_else(|| AppError::BadRequest("Missing file name".to_string()))?;

        // Stream the field straight into the coordinator; the body is
        // never buffered whole in the handler.
        let reader = StreamReader::new(Box::pin(field.map_err(io::Error::other)));
        let outcome = state
            .coordinator
            .upload(&session_id, &file_name, reader)
            .await?;

        return Ok(Json(UploadResponse {
            file_url: outcome.url,
            key: outcome.key,
            session_id: outcome.session_id,
            size: outcome.size_bytes,
            parts: outcome.parts,
        }));
    }

    Err(AppError::BadRequest(
        "Missing `file` field in multipart body".to_string(),
    ))
}

/// Subscribe to progress for one upload session. Events carry
/// `{partNumber, percentage}` payloads; a terminal `complete` event
/// closes the stream. Subscribing again for the same session replaces
/// this subscription.
pub async fn progress_events(
    State(state): State<crate::AppState>,
    Path(session_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.progress.register(&session_id);
    tracing::info!(%session_id, "progress subscriber registered");

    let stream = async_stream::stream! {
        while let Some(update) = rx.recv().await {
            match update {
                ProgressUpdate::Part(event) => {
                    if let Ok(event) = Event::default().json_data(&event) {
                        yield Ok(event);
                    }
                }
                ProgressUpdate::Complete => {
                    yield Ok(Event::default().event("complete").data("complete"));
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[utoipa::path(
    delete,
    path = "/api/files",
    request_body = DeleteRequest,
    responses(
        (status = 200, description = "Deletion outcome", body = DeleteResponse)
    ),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<crate::AppState>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    state
        .store
        .delete_object(&state.config.bucket, &req.key)
        .await?;

    Ok(Json(DeleteResponse { deleted: true }))
}
