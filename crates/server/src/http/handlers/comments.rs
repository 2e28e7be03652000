use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use domain::{
    assemble, Comment, CommentError, CommentEvent, CommentFilters, CommentSort,
    CommentWithReplies, CreateComment, FineId, ParentFilter, RecentComment, UpdateComment,
};
use serde::{Deserialize, Serialize};

use crate::http::{auth::AuthUser, error::ApiResult};
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct ListParams {
    pub sort: Option<CommentSort>,
    pub author_id: Option<String>,
    #[serde(default)]
    pub roots_only: bool,
    pub parent_id: Option<String>,
    pub date_from: Option<NaiveDateTime>,
    pub date_to: Option<NaiveDateTime>,
    pub search: Option<String>,
    pub limit: Option<i64>,
}

impl ListParams {
    fn filters(&self) -> CommentFilters {
        let parent = match (&self.parent_id, self.roots_only) {
            (Some(p), _) if !p.trim().is_empty() => ParentFilter::RepliesTo(p.clone()),
            (_, true) => ParentFilter::RootsOnly,
            _ => ParentFilter::Any,
        };
        CommentFilters {
            author_id: self.author_id.clone().filter(|a| !a.is_empty()),
            parent,
            date_from: self.date_from,
            date_to: self.date_to,
            search: self.search.clone(),
        }
    }
}

#[derive(Deserialize)]
pub struct SortParams {
    pub sort: Option<CommentSort>,
}

#[derive(Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct EditRequest {
    pub content: String,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: i64,
}

pub(crate) fn parse_fine_id(raw: String) -> Result<FineId, CommentError> {
    FineId::new(raw).map_err(CommentError::Validation)
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(fine_id): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Comment>>> {
    let fine_id = parse_fine_id(fine_id)?;
    let limit = params
        .limit
        .unwrap_or(state.settings.comments.list_limit)
        .clamp(1, state.settings.comments.list_limit.max(1));
    let comments = state
        .db
        .list_comments(
            &fine_id,
            &params.filters(),
            params.sort.unwrap_or(CommentSort::Newest),
            limit,
        )
        .await?;
    Ok(Json(comments))
}

pub async fn threaded_comments(
    State(state): State<AppState>,
    Path(fine_id): Path<String>,
    Query(params): Query<SortParams>,
) -> ApiResult<Json<Vec<CommentWithReplies>>> {
    let fine_id = parse_fine_id(fine_id)?;
    let rows = state
        .db
        .list_comments(
            &fine_id,
            &CommentFilters::default(),
            CommentSort::Oldest,
            state.settings.comments.list_limit,
        )
        .await?;
    Ok(Json(assemble(rows, params.sort.unwrap_or(CommentSort::Thread))))
}

pub async fn count_comments(
    State(state): State<AppState>,
    Path(fine_id): Path<String>,
) -> ApiResult<Json<CountResponse>> {
    let fine_id = parse_fine_id(fine_id)?;
    let count = state.db.count_comments(&fine_id).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn recent_comments(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<Vec<RecentComment>>> {
    let limit = params
        .limit
        .unwrap_or(state.settings.comments.recent_limit)
        .clamp(1, 100);
    Ok(Json(state.db.recent_comments(limit).await?))
}

pub async fn get_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
) -> ApiResult<Json<Comment>> {
    Ok(Json(state.db.get_comment(&comment_id).await?))
}

pub async fn post_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<CreateComment>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let comment = state.db.create_comment(&user.id, payload).await?;
    state.publish(CommentEvent::Inserted(comment.clone()));
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn edit_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(comment_id): Path<String>,
    Json(payload): Json<EditRequest>,
) -> ApiResult<Json<Comment>> {
    let input = UpdateComment {
        id: comment_id,
        content: payload.content,
    };
    let comment = state.db.update_comment(&user.id, input).await?;
    state.publish(CommentEvent::Modified(comment.clone()));
    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(comment_id): Path<String>,
) -> ApiResult<Json<Comment>> {
    let comment = state.db.soft_delete_comment(&user.id, &comment_id).await?;
    state.publish(CommentEvent::Removed(comment.clone()));
    Ok(Json(comment))
}
