use crate::{CommentError, FineId};
use serde::{Deserialize, Serialize};

pub const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateComment {
    pub fine_id: FineId,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub content: String,
}

impl CreateComment {
    pub fn validated(mut self) -> Result<Self, CommentError> {
        self.content = validate_content(&self.content)?;
        if matches!(self.parent_id.as_deref(), Some(p) if p.trim().is_empty()) {
            self.parent_id = None;
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateComment {
    pub id: String,
    pub content: String,
}

impl UpdateComment {
    pub fn validated(mut self) -> Result<Self, CommentError> {
        self.content = validate_content(&self.content)?;
        Ok(self)
    }
}

fn validate_content(raw: &str) -> Result<String, CommentError> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(CommentError::Validation("Comment cannot be empty".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(CommentError::Validation(format!(
            "Comment is too long (max {} characters)",
            MAX_CONTENT_CHARS
        )));
    }
    Ok(content.to_string())
}
