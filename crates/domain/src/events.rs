use crate::models::{Comment, FineId};
use serde::{Deserialize, Serialize};

/// 写入提交后推送的整行快照，按 id 整行替换
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "comment", rename_all = "snake_case")]
pub enum CommentEvent {
    Inserted(Comment),
    Modified(Comment),
    // 软删除：行仍然存在，is_deleted = true
    Removed(Comment),
}

impl CommentEvent {
    pub fn comment(&self) -> &Comment {
        match self {
            CommentEvent::Inserted(c) | CommentEvent::Modified(c) | CommentEvent::Removed(c) => c,
        }
    }

    pub fn fine_id(&self) -> &FineId {
        &self.comment().fine_id
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommentEvent::Inserted(_) => "comment_inserted",
            CommentEvent::Modified(_) => "comment_modified",
            CommentEvent::Removed(_) => "comment_removed",
        }
    }
}
