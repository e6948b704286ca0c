use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_derive::{Deserialize, Serialize};
use tracing::{error, warn};

use contacts_common::page::{fetch_page, PageError, PageRequest};
use contacts_common::record::StoredContact;

use super::app::AppState;
use super::submit::ErrorResponse;

/// Raw query values. Kept as strings so bad input gets our own 400 instead of a rejection.
#[derive(Deserialize, Debug)]
pub struct FetchParams {
    page: Option<String>,
    limit: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct FetchResponse {
    pub message: String,
    pub data: Vec<StoredContact>,
    pub total: i64,
}

pub async fn get_fetch(
    State(state): State<AppState>,
    Query(params): Query<FetchParams>,
) -> Result<Json<FetchResponse>, (StatusCode, Json<ErrorResponse>)> {
    let request = PageRequest::parse(params.page.as_deref(), params.limit.as_deref())
        .map_err(page_error)?;

    let page = fetch_page(state.store.as_ref(), request)
        .await
        .map_err(page_error)?;

    Ok(Json(FetchResponse {
        message: "Data fetched successfully!".to_owned(),
        data: page.records,
        total: page.total,
    }))
}

fn page_error(err: PageError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, message) = match &err {
        PageError::Storage(_) => {
            error!("error fetching data: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error fetching data.".to_owned(),
            )
        }
        invalid => {
            warn!("rejected page request: {}", invalid);
            (StatusCode::BAD_REQUEST, invalid.to_string())
        }
    };

    (status, Json(ErrorResponse { error: message }))
}
