use crate::{models::SqlFine, Db};
use chrono::Utc;
use domain::{Fine, FineId};

pub struct NewFine {
    pub description: String,
    pub subject_name: String,
    pub proposer_name: String,
}

impl Db {
    pub async fn insert_fine(&self, fine: NewFine) -> anyhow::Result<Fine> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO fines (id, description, subject_name, proposer_name, comment_count, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&id)
        .bind(&fine.description)
        .bind(&fine.subject_name)
        .bind(&fine.proposer_name)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_fine(&FineId::new_unchecked(id))
            .await?
            .ok_or_else(|| anyhow::anyhow!("Fine vanished right after insert"))
    }

    pub async fn get_fine(&self, fine_id: &FineId) -> anyhow::Result<Option<Fine>> {
        let row = sqlx::query_as::<_, SqlFine>(
            r#"
            SELECT id, description, subject_name, proposer_name, comment_count, created_at
            FROM fines
            WHERE id = ?
            "#,
        )
        .bind(fine_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}
