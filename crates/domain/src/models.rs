use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DELETED_MARKER: &str = "[deleted]";

// 持久化的 id 是 UUID，不会以此开头
pub const PENDING_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FineId(String);

impl FineId {
    pub fn new(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        if s.is_empty() {
            return Err("Fine ID cannot be empty.".to_string());
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err("Fine ID contains invalid characters.".to_string());
        }
        if s.len() > 64 {
            return Err("Fine ID is too long (max 64 chars).".to_string());
        }
        Ok(Self(s))
    }

    pub fn new_unchecked(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub fine_id: FineId,
    pub author_id: String,
    // 作者快照：创建时写入，之后不随用户改名而变化
    pub author_name: String,
    pub author_username: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub is_deleted: bool,
    pub is_edited: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingComment {
    pub id: String,
    pub fine_id: FineId,
    pub author_id: String,
    pub author_name: String,
    pub author_username: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl PendingComment {
    pub fn is_superseded_by(&self, comment: &Comment) -> bool {
        self.fine_id == comment.fine_id
            && self.author_id == comment.author_id
            && self.parent_id == comment.parent_id
            && self.content == comment.content
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CommentEntry {
    Confirmed(Comment),
    Pending(PendingComment),
}

impl CommentEntry {
    pub fn id(&self) -> &str {
        match self {
            CommentEntry::Confirmed(c) => &c.id,
            CommentEntry::Pending(p) => &p.id,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            CommentEntry::Confirmed(c) => c.parent_id.as_deref(),
            CommentEntry::Pending(p) => p.parent_id.as_deref(),
        }
    }

    pub fn created_at(&self) -> NaiveDateTime {
        match self {
            CommentEntry::Confirmed(c) => c.created_at,
            CommentEntry::Pending(p) => p.created_at,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            CommentEntry::Confirmed(c) => &c.content,
            CommentEntry::Pending(p) => &p.content,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, CommentEntry::Confirmed(c) if c.is_deleted)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CommentEntry::Pending(_))
    }

    pub fn as_confirmed(&self) -> Option<&Comment> {
        match self {
            CommentEntry::Confirmed(c) => Some(c),
            CommentEntry::Pending(_) => None,
        }
    }
}

impl From<Comment> for CommentEntry {
    fn from(c: Comment) -> Self {
        CommentEntry::Confirmed(c)
    }
}

impl From<PendingComment> for CommentEntry {
    fn from(p: PendingComment) -> Self {
        CommentEntry::Pending(p)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fine {
    pub id: FineId,
    pub description: String,
    pub subject_name: String,
    pub proposer_name: String,
    pub comment_count: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FineSummary {
    pub id: FineId,
    pub description: String,
    pub subject_name: String,
    pub proposer_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub fine: FineSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub username: String,
}
