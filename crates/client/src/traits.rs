use async_trait::async_trait;
use domain::{
    Comment, CommentError, CommentEvent, CommentFilters, CommentSort, CreateComment, FineId,
    RecentComment, UpdateComment,
};
use futures::stream::BoxStream;

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn list(
        &self,
        fine_id: &FineId,
        filters: &CommentFilters,
        sort: CommentSort,
        limit: i64,
    ) -> Result<Vec<Comment>, CommentError>;

    async fn get(&self, comment_id: &str) -> Result<Comment, CommentError>;

    async fn create(&self, input: CreateComment) -> Result<Comment, CommentError>;

    async fn update(&self, input: UpdateComment) -> Result<Comment, CommentError>;

    async fn soft_delete(&self, comment_id: &str) -> Result<Comment, CommentError>;

    async fn count(&self, fine_id: &FineId) -> Result<i64, CommentError>;

    async fn recent(&self, limit: i64) -> Result<Vec<RecentComment>, CommentError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    Event(CommentEvent),
    // 接收端落后，跳过了这么多事件
    Lagged(u64),
}

pub type EventStream = BoxStream<'static, PushMessage>;

pub trait PushChannel: Send + Sync {
    fn subscribe(&self, fine_id: &FineId) -> EventStream;
}
