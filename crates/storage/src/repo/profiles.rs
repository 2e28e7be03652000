use crate::{models::SqlProfile, Db};
use domain::UserProfile;

impl Db {
    pub async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, SqlProfile>(
            "SELECT id, display_name, username FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile.map(Into::into))
    }

    // 用户资料由认证系统维护，这里只做同步写入
    pub async fn upsert_user(&self, profile: &UserProfile) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, display_name, username)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                username = excluded.username
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.display_name)
        .bind(&profile.username)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
