use chrono::NaiveDateTime;
use domain::{Comment, Fine, FineId, FineSummary, RecentComment, UserProfile};
use sqlx::FromRow;

pub(crate) const COMMENT_COLUMNS: &str = "c.id, c.fine_id, c.author_id, c.author_name, \
    c.author_username, c.parent_id, c.content, c.is_deleted, c.is_edited, \
    c.created_at, c.updated_at";

#[derive(FromRow)]
pub struct SqlComment {
    pub id: String,
    pub fine_id: String,
    pub author_id: String,
    pub author_name: String,
    pub author_username: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub is_deleted: bool,
    pub is_edited: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<SqlComment> for Comment {
    fn from(sql: SqlComment) -> Self {
        Comment {
            id: sql.id,
            fine_id: FineId::new_unchecked(sql.fine_id),
            author_id: sql.author_id,
            author_name: sql.author_name,
            author_username: sql.author_username,
            parent_id: sql.parent_id,
            content: sql.content,
            is_deleted: sql.is_deleted,
            is_edited: sql.is_edited,
            created_at: sql.created_at,
            updated_at: sql.updated_at,
        }
    }
}

#[derive(FromRow)]
pub struct SqlRecentComment {
    #[sqlx(flatten)]
    pub comment: SqlComment,
    // Join 字段 (来自 fines 表)
    pub fine_description: String,
    pub fine_subject_name: String,
    pub fine_proposer_name: String,
}

impl From<SqlRecentComment> for RecentComment {
    fn from(sql: SqlRecentComment) -> Self {
        let comment: Comment = sql.comment.into();
        RecentComment {
            fine: FineSummary {
                id: comment.fine_id.clone(),
                description: sql.fine_description,
                subject_name: sql.fine_subject_name,
                proposer_name: sql.fine_proposer_name,
            },
            comment,
        }
    }
}

#[derive(FromRow)]
pub struct SqlFine {
    pub id: String,
    pub description: String,
    pub subject_name: String,
    pub proposer_name: String,
    pub comment_count: i64,
    pub created_at: NaiveDateTime,
}

impl From<SqlFine> for Fine {
    fn from(sql: SqlFine) -> Self {
        Fine {
            id: FineId::new_unchecked(sql.id),
            description: sql.description,
            subject_name: sql.subject_name,
            proposer_name: sql.proposer_name,
            comment_count: sql.comment_count,
            created_at: sql.created_at,
        }
    }
}

#[derive(FromRow)]
pub struct SqlProfile {
    pub id: String,
    pub display_name: String,
    pub username: String,
}

impl From<SqlProfile> for UserProfile {
    fn from(sql: SqlProfile) -> Self {
        UserProfile {
            id: sql.id,
            display_name: sql.display_name,
            username: sql.username,
        }
    }
}
