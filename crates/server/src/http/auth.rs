use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use domain::{CommentError, UserProfile};

use super::error::ApiError;
use crate::state::AppState;

/// 从可信请求头解析调用者
pub struct AuthUser(pub UserProfile);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(state.settings.server.user_header.as_str())
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(CommentError::Unauthenticated)?;

        match state.db.get_user(user_id).await? {
            Some(profile) => Ok(AuthUser(profile)),
            None => {
                tracing::warn!("Unknown user in auth header: {}", user_id);
                Err(CommentError::Unauthenticated.into())
            }
        }
    }
}
