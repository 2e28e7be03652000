use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Comment,
    ParentComment,
    Fine,
    Profile,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Comment => "Comment",
            Entity::ParentComment => "Parent comment",
            Entity::Fine => "Fine",
            Entity::Profile => "User profile",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommentError {
    #[error("Must be authenticated to change comments")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(Entity),

    #[error("Cannot reply to a reply. Please reply to the original comment.")]
    InvalidThread,

    #[error("You can only change your own comments")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("Comment store unavailable: {0}")]
    Transient(String),
}

impl CommentError {
    // 只有存储层故障值得重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommentError::Transient(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            CommentError::Unauthenticated => "unauthenticated",
            CommentError::NotFound(_) => "not_found",
            CommentError::InvalidThread => "invalid_thread",
            CommentError::Forbidden => "forbidden",
            CommentError::Validation(_) => "validation",
            CommentError::Transient(_) => "transient",
        }
    }
}
