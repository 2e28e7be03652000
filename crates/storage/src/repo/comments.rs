use crate::{
    models::{SqlComment, SqlRecentComment, COMMENT_COLUMNS},
    transient, Db,
};
use chrono::{Duration, NaiveDateTime, Utc};
use domain::{
    Comment, CommentError, CommentFilters, CommentSort, CreateComment, Entity, FineId,
    ParentFilter, RecentComment, UpdateComment, DELETED_MARKER,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::info;

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const DEFAULT_RECENT_LIMIT: i64 = 10;

impl Db {
    pub async fn list_comments(
        &self,
        fine_id: &FineId,
        filters: &CommentFilters,
        sort: CommentSort,
        limit: i64,
    ) -> Result<Vec<Comment>, CommentError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM comments c LEFT JOIN comments p ON c.parent_id = p.id WHERE c.fine_id = ",
            COMMENT_COLUMNS
        ));
        qb.push_bind(fine_id.as_str().to_string());
        qb.push(" AND c.is_deleted = FALSE");

        if let Some(author) = &filters.author_id {
            qb.push(" AND c.author_id = ").push_bind(author.clone());
        }
        match &filters.parent {
            ParentFilter::Any => {}
            ParentFilter::RootsOnly => {
                qb.push(" AND c.parent_id IS NULL");
            }
            ParentFilter::RepliesTo(parent) => {
                qb.push(" AND c.parent_id = ").push_bind(parent.clone());
            }
        }
        if let Some(from) = filters.date_from {
            qb.push(" AND c.created_at >= ").push_bind(from);
        }
        if let Some(to) = filters.date_to {
            qb.push(" AND c.created_at <= ").push_bind(to);
        }
        if let Some(term) = filters.search_term() {
            let pattern = format!("%{}%", escape_like(&term.to_ascii_lowercase()));
            qb.push(" AND (lower(c.content) LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR lower(c.author_name) LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }

        qb.push(match sort {
            CommentSort::Oldest => " ORDER BY c.created_at ASC, c.id ASC",
            CommentSort::Newest => " ORDER BY c.created_at DESC, c.id ASC",
            // 线程路径：根评论时间 → 根评论 id → 根在前 → 回复按时间
            CommentSort::Thread => {
                " ORDER BY COALESCE(p.created_at, c.created_at) ASC, \
                 COALESCE(c.parent_id, c.id) ASC, \
                 (c.parent_id IS NOT NULL) ASC, \
                 c.created_at ASC, c.id ASC"
            }
        });
        qb.push(" LIMIT ").push_bind(limit.max(1));

        let rows = qb
            .build_query_as::<SqlComment>()
            .fetch_all(&self.pool)
            .await
            .map_err(transient)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_comment(&self, comment_id: &str) -> Result<Comment, CommentError> {
        let mut conn = self.pool.acquire().await.map_err(transient)?;
        fetch_comment(&mut conn, comment_id)
            .await?
            .ok_or(CommentError::NotFound(Entity::Comment))
    }

    pub async fn count_comments(&self, fine_id: &FineId) -> Result<i64, CommentError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE fine_id = ? AND is_deleted = FALSE")
            .bind(fine_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(transient)
    }

    pub async fn create_comment(
        &self,
        caller_id: &str,
        input: CreateComment,
    ) -> Result<Comment, CommentError> {
        let input = input.validated()?;
        let mut tx = self.pool.begin().await.map_err(transient)?;

        let profile = sqlx::query_as::<_, (String, String)>(
            "SELECT display_name, username FROM users WHERE id = ?",
        )
        .bind(caller_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(transient)?
        .ok_or(CommentError::NotFound(Entity::Profile))?;

        let fine_exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM fines WHERE id = ?")
            .bind(input.fine_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(transient)?;
        if fine_exists.is_none() {
            return Err(CommentError::NotFound(Entity::Fine));
        }

        // 只允许两层：回复的父评论必须是同一罚单下的根评论
        if let Some(parent_id) = &input.parent_id {
            let parent = fetch_comment(&mut tx, parent_id)
                .await?
                .ok_or(CommentError::NotFound(Entity::ParentComment))?;
            if parent.parent_id.is_some() || parent.fine_id != input.fine_id {
                return Err(CommentError::InvalidThread);
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO comments (
                id, fine_id, author_id, author_name, author_username,
                parent_id, content, is_deleted, is_edited, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, FALSE, FALSE, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(input.fine_id.as_str())
        .bind(caller_id)
        .bind(&profile.0)
        .bind(&profile.1)
        .bind(&input.parent_id)
        .bind(&input.content)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(transient)?;

        let count = recount(&mut tx, &input.fine_id).await?;
        let comment = fetch_comment(&mut tx, &id)
            .await?
            .ok_or(CommentError::NotFound(Entity::Comment))?;

        tx.commit().await.map_err(transient)?;
        info!(
            "Comment created: {} on fine {} (count = {})",
            comment.id, comment.fine_id, count
        );
        Ok(comment)
    }

    pub async fn update_comment(
        &self,
        caller_id: &str,
        input: UpdateComment,
    ) -> Result<Comment, CommentError> {
        let input = input.validated()?;
        let mut tx = self.pool.begin().await.map_err(transient)?;

        let existing = fetch_comment(&mut tx, &input.id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or(CommentError::NotFound(Entity::Comment))?;
        if existing.author_id != caller_id {
            return Err(CommentError::Forbidden);
        }

        sqlx::query(
            "UPDATE comments SET content = ?, is_edited = TRUE, updated_at = ? WHERE id = ?",
        )
        .bind(&input.content)
        .bind(advance(existing.updated_at))
        .bind(&input.id)
        .execute(&mut *tx)
        .await
        .map_err(transient)?;

        let comment = fetch_comment(&mut tx, &input.id)
            .await?
            .ok_or(CommentError::NotFound(Entity::Comment))?;
        tx.commit().await.map_err(transient)?;
        Ok(comment)
    }

    pub async fn soft_delete_comment(
        &self,
        caller_id: &str,
        comment_id: &str,
    ) -> Result<Comment, CommentError> {
        let mut tx = self.pool.begin().await.map_err(transient)?;

        let existing = fetch_comment(&mut tx, comment_id)
            .await?
            .ok_or(CommentError::NotFound(Entity::Comment))?;
        if existing.author_id != caller_id {
            return Err(CommentError::Forbidden);
        }

        if !existing.is_deleted {
            // 软删除：保留行以维持线程结构，但替换内容
            sqlx::query(
                "UPDATE comments SET is_deleted = TRUE, content = ?, updated_at = ? WHERE id = ?",
            )
            .bind(DELETED_MARKER)
            .bind(advance(existing.updated_at))
            .bind(comment_id)
            .execute(&mut *tx)
            .await
            .map_err(transient)?;
        }

        // 总是从头重算，重复删除不会多减
        let count = recount(&mut tx, &existing.fine_id).await?;
        let comment = fetch_comment(&mut tx, comment_id)
            .await?
            .ok_or(CommentError::NotFound(Entity::Comment))?;
        tx.commit().await.map_err(transient)?;

        info!(
            "Comment deleted: {} on fine {} (count = {})",
            comment.id, comment.fine_id, count
        );
        Ok(comment)
    }

    pub async fn recent_comments(&self, limit: i64) -> Result<Vec<RecentComment>, CommentError> {
        let sql = format!(
            r#"
            SELECT {},
                f.description AS fine_description,
                f.subject_name AS fine_subject_name,
                f.proposer_name AS fine_proposer_name
            FROM comments c
            JOIN fines f ON f.id = c.fine_id
            WHERE c.is_deleted = FALSE
            ORDER BY c.created_at DESC, c.id ASC
            LIMIT ?
            "#,
            COMMENT_COLUMNS
        );

        let rows = sqlx::query_as::<_, SqlRecentComment>(&sql)
            .bind(limit.max(1))
            .fetch_all(&self.pool)
            .await
            .map_err(transient)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

async fn fetch_comment(
    conn: &mut SqliteConnection,
    comment_id: &str,
) -> Result<Option<Comment>, CommentError> {
    let sql = format!("SELECT {} FROM comments c WHERE c.id = ?", COMMENT_COLUMNS);
    let row = sqlx::query_as::<_, SqlComment>(&sql)
        .bind(comment_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(transient)?;
    Ok(row.map(Into::into))
}

// 按未删除的行重新计算 comment_count
async fn recount(conn: &mut SqliteConnection, fine_id: &FineId) -> Result<i64, CommentError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE fine_id = ? AND is_deleted = FALSE")
            .bind(fine_id.as_str())
            .fetch_one(&mut *conn)
            .await
            .map_err(transient)?;

    sqlx::query("UPDATE fines SET comment_count = ? WHERE id = ?")
        .bind(count)
        .bind(fine_id.as_str())
        .execute(&mut *conn)
        .await
        .map_err(transient)?;

    Ok(count)
}

// updated_at 必须严格前进
fn advance(previous: NaiveDateTime) -> NaiveDateTime {
    Utc::now()
        .naive_utc()
        .max(previous + Duration::microseconds(1))
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
