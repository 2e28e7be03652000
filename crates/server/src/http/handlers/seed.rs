// 仅用于演示和测试的数据初始化

use axum::{extract::State, http::StatusCode, Json};
use domain::{CommentError, Fine, UserProfile};
use serde::Deserialize;
use storage::NewFine;

use crate::http::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateFineRequest {
    pub description: String,
    pub subject_name: String,
    pub proposer_name: String,
}

pub async fn upsert_user(
    State(state): State<AppState>,
    Json(profile): Json<UserProfile>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    if profile.id.trim().is_empty() || profile.username.trim().is_empty() {
        return Err(CommentError::Validation("User id and username are required".into()).into());
    }
    state.db.upsert_user(&profile).await?;
    tracing::info!("User profile saved: {}", profile.id);
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn create_fine(
    State(state): State<AppState>,
    Json(req): Json<CreateFineRequest>,
) -> ApiResult<(StatusCode, Json<Fine>)> {
    if req.description.trim().is_empty() {
        return Err(CommentError::Validation("Fine description is required".into()).into());
    }
    let fine = state
        .db
        .insert_fine(NewFine {
            description: req.description,
            subject_name: req.subject_name,
            proposer_name: req.proposer_name,
        })
        .await?;
    tracing::info!("Fine created: {}", fine.id);
    Ok((StatusCode::CREATED, Json(fine)))
}
