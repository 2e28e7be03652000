use async_trait::async_trait;
use domain::{
    Comment, CommentError, CommentEvent, CommentFilters, CommentSort, CreateComment, FineId,
    RecentComment, Session, UpdateComment,
};
use std::sync::Arc;
use storage::Db;

use crate::channel::BroadcastChannel;
use crate::traits::CommentStore;

#[derive(Clone)]
pub struct LocalStore {
    db: Db,
    session: Arc<dyn Session>,
    events: Option<BroadcastChannel>,
}

impl LocalStore {
    pub fn new(db: Db, session: Arc<dyn Session>) -> Self {
        Self {
            db,
            session,
            events: None,
        }
    }

    pub fn publishing_to(mut self, channel: &BroadcastChannel) -> Self {
        self.events = Some(channel.clone());
        self
    }

    fn caller(&self) -> Result<String, CommentError> {
        self.session
            .current_user()
            .map(|u| u.id)
            .ok_or(CommentError::Unauthenticated)
    }

    fn publish(&self, event: CommentEvent) {
        if let Some(channel) = &self.events {
            channel.publish(event);
        }
    }
}

#[async_trait]
impl CommentStore for LocalStore {
    async fn list(
        &self,
        fine_id: &FineId,
        filters: &CommentFilters,
        sort: CommentSort,
        limit: i64,
    ) -> Result<Vec<Comment>, CommentError> {
        self.db.list_comments(fine_id, filters, sort, limit).await
    }

    async fn get(&self, comment_id: &str) -> Result<Comment, CommentError> {
        self.db.get_comment(comment_id).await
    }

    async fn create(&self, input: CreateComment) -> Result<Comment, CommentError> {
        let caller = self.caller()?;
        let comment = self.db.create_comment(&caller, input).await?;
        self.publish(CommentEvent::Inserted(comment.clone()));
        Ok(comment)
    }

    async fn update(&self, input: UpdateComment) -> Result<Comment, CommentError> {
        let caller = self.caller()?;
        let comment = self.db.update_comment(&caller, input).await?;
        self.publish(CommentEvent::Modified(comment.clone()));
        Ok(comment)
    }

    async fn soft_delete(&self, comment_id: &str) -> Result<Comment, CommentError> {
        let caller = self.caller()?;
        let comment = self.db.soft_delete_comment(&caller, comment_id).await?;
        self.publish(CommentEvent::Removed(comment.clone()));
        Ok(comment)
    }

    async fn count(&self, fine_id: &FineId) -> Result<i64, CommentError> {
        self.db.count_comments(fine_id).await
    }

    async fn recent(&self, limit: i64) -> Result<Vec<RecentComment>, CommentError> {
        self.db.recent_comments(limit).await
    }
}
