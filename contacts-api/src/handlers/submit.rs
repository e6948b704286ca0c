use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, error};

use contacts_common::artifact::UploadArtifact;
use contacts_common::pipeline::PipelineError;
use contacts_common::record::ContactRecord;

use super::app::AppState;

/// Name of the multipart field carrying the delimited file.
const FILE_FIELD: &str = "file";

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitResponse {
    pub message: String,
    pub inserted: u64,
    pub updated: u64,
    pub duplicates: Vec<ContactRecord>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

type SubmitError = (StatusCode, Json<ErrorResponse>);

pub async fn post_submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, SubmitError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| reject(StatusCode::BAD_REQUEST, "Error processing file.", e))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        debug!(file_name = ?field.file_name(), "receiving upload");
        let artifact = UploadArtifact::persist_from_stream(&state.upload_dir, field)
            .await
            .map_err(|e| reject(StatusCode::BAD_REQUEST, "Error processing file.", e))?;
        upload = Some(artifact);
        break;
    }

    let outcome = state.pipeline.submit(upload).await.map_err(pipeline_error)?;

    let message = if outcome.inserted > 0 {
        "Form data submitted successfully!"
    } else {
        "No new records inserted."
    };

    Ok(Json(SubmitResponse {
        message: message.to_owned(),
        inserted: outcome.inserted,
        updated: outcome.updated,
        duplicates: outcome.duplicates,
    }))
}

fn pipeline_error(err: PipelineError) -> SubmitError {
    let (status, message) = match &err {
        PipelineError::NoFileProvided => (StatusCode::BAD_REQUEST, "Please provide a file."),
        PipelineError::FileParseFailed(_) => (StatusCode::BAD_REQUEST, "Error processing file."),
        PipelineError::StorageLookupFailed(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error checking for duplicate emails.",
        ),
        PipelineError::StorageWriteFailed(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Error inserting records.")
        }
        PipelineError::StorageUpdateFailed { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Error updating records.")
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: message.to_owned(),
        }),
    )
}

fn reject<E: std::fmt::Display>(status: StatusCode, message: &str, err: E) -> SubmitError {
    error!("{}: {}", message, err);
    (
        status,
        Json(ErrorResponse {
            error: message.to_owned(),
        }),
    )
}
