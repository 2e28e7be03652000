use domain::{
    Comment, CommentError, CreateComment, PendingComment, Session, UpdateComment,
    PENDING_ID_PREFIX,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::{KeyPrefix, QueryCache, QueryKind};
use crate::traits::CommentStore;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 当前用户的写入路径，新评论先显示占位，失败时回滚
#[derive(Clone)]
pub struct OptimisticWriter {
    cache: QueryCache,
    store: Arc<dyn CommentStore>,
    session: Arc<dyn Session>,
    timeout: Duration,
}

impl OptimisticWriter {
    pub fn new(cache: QueryCache, store: Arc<dyn CommentStore>, session: Arc<dyn Session>) -> Self {
        Self {
            cache,
            store,
            session,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn submit(&self, input: CreateComment) -> Result<Comment, CommentError> {
        let user = self
            .session
            .current_user()
            .ok_or(CommentError::Unauthenticated)?;
        let input = input.validated()?;
        let fine_id = input.fine_id.clone();

        let snapshot = self
            .cache
            .snapshot(&KeyPrefix::fine(&fine_id).with_kind(QueryKind::Threaded));

        let now = chrono::Utc::now().naive_utc();
        let pending = PendingComment {
            id: placeholder_id(),
            fine_id: fine_id.clone(),
            author_id: user.id,
            author_name: user.display_name,
            author_username: user.username,
            parent_id: input.parent_id.clone(),
            content: input.content.clone(),
            created_at: now,
            updated_at: now,
        };
        self.cache.insert_pending(&pending);
        let with_placeholder = self
            .cache
            .snapshot(&KeyPrefix::fine(&fine_id).with_kind(QueryKind::Threaded));

        match self.bounded(self.store.create(input)).await {
            Ok(comment) => {
                info!("Comment {} confirmed, replacing {}", comment.id, pending.id);
                self.cache.invalidate_matching(&KeyPrefix::fine(&fine_id));
                self.cache
                    .invalidate_matching(&KeyPrefix::kind(QueryKind::Recent));
                Ok(comment)
            }
            Err(e) => {
                if self.cache.unchanged_since(&with_placeholder) {
                    self.cache.restore(snapshot);
                } else {
                    // 等待期间有推送写入，只撤掉占位，其余交给重新拉取
                    self.cache.remove_pending(&fine_id, &pending.id);
                    self.cache.invalidate_matching(&KeyPrefix::fine(&fine_id));
                }
                warn!("Comment on fine {} rolled back: {}", fine_id, e);
                Err(e)
            }
        }
    }

    pub async fn update(&self, input: UpdateComment) -> Result<Comment, CommentError> {
        if self.session.current_user().is_none() {
            return Err(CommentError::Unauthenticated);
        }
        let input = input.validated()?;
        let comment = self.bounded(self.store.update(input)).await?;
        self.cache.apply_replaced(&comment);
        Ok(comment)
    }

    pub async fn remove(&self, comment_id: &str) -> Result<Comment, CommentError> {
        if self.session.current_user().is_none() {
            return Err(CommentError::Unauthenticated);
        }
        let comment = self.bounded(self.store.soft_delete(comment_id)).await?;
        self.cache.apply_removed(&comment);
        Ok(comment)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, CommentError>>,
    ) -> Result<T, CommentError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CommentError::Transient(format!(
                "Request timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

fn placeholder_id() -> String {
    format!(
        "{}{}-{:08x}",
        PENDING_ID_PREFIX,
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, CacheValue};
    use async_trait::async_trait;
    use domain::{
        CommentFilters, CommentSort, CommentWithReplies, CurrentUser, FineId, RecentComment,
        StaticSession,
    };
    use std::sync::Mutex;

    fn fine() -> FineId {
        FineId::new_unchecked("f1".into())
    }

    fn alice() -> CurrentUser {
        CurrentUser {
            id: "u1".into(),
            display_name: "Alice".into(),
            username: "alice".into(),
        }
    }

    fn root() -> Comment {
        let ts = chrono::DateTime::from_timestamp(100, 0).unwrap().naive_utc();
        Comment {
            id: "a".into(),
            fine_id: fine(),
            author_id: "u1".into(),
            author_name: "Alice".into(),
            author_username: "alice".into(),
            parent_id: None,
            content: "root".into(),
            is_deleted: false,
            is_edited: false,
            created_at: ts,
            updated_at: ts,
        }
    }

    struct FailingStore {
        error: CommentError,
        calls: Mutex<usize>,
    }

    impl FailingStore {
        fn new(error: CommentError) -> Self {
            Self {
                error,
                calls: Mutex::new(0),
            }
        }

        fn fail(&self) -> CommentError {
            *self.calls.lock().unwrap() += 1;
            self.error.clone()
        }
    }

    #[async_trait]
    impl CommentStore for FailingStore {
        async fn list(
            &self,
            _: &FineId,
            _: &CommentFilters,
            _: CommentSort,
            _: i64,
        ) -> Result<Vec<Comment>, CommentError> {
            Err(self.fail())
        }
        async fn get(&self, _: &str) -> Result<Comment, CommentError> {
            Err(self.fail())
        }
        async fn create(&self, _: CreateComment) -> Result<Comment, CommentError> {
            Err(self.fail())
        }
        async fn update(&self, _: UpdateComment) -> Result<Comment, CommentError> {
            Err(self.fail())
        }
        async fn soft_delete(&self, _: &str) -> Result<Comment, CommentError> {
            Err(self.fail())
        }
        async fn count(&self, _: &FineId) -> Result<i64, CommentError> {
            Err(self.fail())
        }
        async fn recent(&self, _: i64) -> Result<Vec<RecentComment>, CommentError> {
            Err(self.fail())
        }
    }

    fn seeded_cache() -> QueryCache {
        let cache = QueryCache::new();
        for sort in [CommentSort::Thread, CommentSort::Newest] {
            cache.write(
                CacheKey::threaded(&fine(), sort),
                CacheValue::Threads(vec![CommentWithReplies::new(root(), vec![])]),
            );
        }
        cache.write(CacheKey::count(&fine()), CacheValue::Count(1));
        cache
    }

    fn input(parent: Option<&str>, content: &str) -> CreateComment {
        CreateComment {
            fine_id: fine(),
            parent_id: parent.map(Into::into),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn test_failed_submit_restores_cache_exactly() {
        for parent in [None, Some("a")] {
            let cache = seeded_cache();
            let before = cache.snapshot(&KeyPrefix::all());
            let store = Arc::new(FailingStore::new(CommentError::InvalidThread));
            let writer = OptimisticWriter::new(
                cache.clone(),
                store.clone(),
                Arc::new(StaticSession::signed_in(alice())),
            );

            let err = writer.submit(input(parent, "hello")).await.unwrap_err();

            assert_eq!(err, CommentError::InvalidThread);
            assert_eq!(*store.calls.lock().unwrap(), 1);
            let mut after = cache.snapshot(&KeyPrefix::all()).entries;
            let mut expected = before.entries.clone();
            after.sort_by_key(|(k, _)| format!("{:?}", k));
            expected.sort_by_key(|(k, _)| format!("{:?}", k));
            assert_eq!(after, expected);
        }
    }

    #[tokio::test]
    async fn test_unauthenticated_never_touches_store_or_cache() {
        let cache = seeded_cache();
        let store = Arc::new(FailingStore::new(CommentError::Transient("x".into())));
        let writer = OptimisticWriter::new(
            cache.clone(),
            store.clone(),
            Arc::new(StaticSession::anonymous()),
        );

        let err = writer.submit(input(None, "hello")).await.unwrap_err();
        assert_eq!(err, CommentError::Unauthenticated);
        assert_eq!(*store.calls.lock().unwrap(), 0);
        assert_eq!(
            writer.remove("a").await.unwrap_err(),
            CommentError::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_blank_content_rejected_locally() {
        let store = Arc::new(FailingStore::new(CommentError::Transient("x".into())));
        let writer = OptimisticWriter::new(
            seeded_cache(),
            store.clone(),
            Arc::new(StaticSession::signed_in(alice())),
        );

        let err = writer.submit(input(None, "   ")).await.unwrap_err();
        assert!(matches!(err, CommentError::Validation(_)));
        assert_eq!(*store.calls.lock().unwrap(), 0);
    }

    struct SlowStore;

    #[async_trait]
    impl CommentStore for SlowStore {
        async fn list(
            &self,
            _: &FineId,
            _: &CommentFilters,
            _: CommentSort,
            _: i64,
        ) -> Result<Vec<Comment>, CommentError> {
            Ok(vec![])
        }
        async fn get(&self, _: &str) -> Result<Comment, CommentError> {
            Ok(root())
        }
        async fn create(&self, _: CreateComment) -> Result<Comment, CommentError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(root())
        }
        async fn update(&self, _: UpdateComment) -> Result<Comment, CommentError> {
            Ok(root())
        }
        async fn soft_delete(&self, _: &str) -> Result<Comment, CommentError> {
            Ok(root())
        }
        async fn count(&self, _: &FineId) -> Result<i64, CommentError> {
            Ok(0)
        }
        async fn recent(&self, _: i64) -> Result<Vec<RecentComment>, CommentError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_timeout_is_transient_and_rolls_back() {
        let cache = seeded_cache();
        let writer = OptimisticWriter::new(
            cache.clone(),
            Arc::new(SlowStore),
            Arc::new(StaticSession::signed_in(alice())),
        )
        .with_timeout(Duration::from_millis(20));

        let err = writer.submit(input(None, "hello")).await.unwrap_err();
        assert!(err.is_retryable());
        match cache.data(&CacheKey::threaded(&fine(), CommentSort::Thread)) {
            Some(CacheValue::Threads(t)) => {
                assert_eq!(t.len(), 1);
                assert!(!t[0].root.is_pending());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    // create 会一直等到放行才失败
    struct GatedStore {
        gate: tokio::sync::Notify,
    }

    #[async_trait]
    impl CommentStore for GatedStore {
        async fn list(
            &self,
            _: &FineId,
            _: &CommentFilters,
            _: CommentSort,
            _: i64,
        ) -> Result<Vec<Comment>, CommentError> {
            Ok(vec![])
        }
        async fn get(&self, _: &str) -> Result<Comment, CommentError> {
            Ok(root())
        }
        async fn create(&self, _: CreateComment) -> Result<Comment, CommentError> {
            self.gate.notified().await;
            Err(CommentError::Transient("connection reset".into()))
        }
        async fn update(&self, _: UpdateComment) -> Result<Comment, CommentError> {
            Ok(root())
        }
        async fn soft_delete(&self, _: &str) -> Result<Comment, CommentError> {
            Ok(root())
        }
        async fn count(&self, _: &FineId) -> Result<i64, CommentError> {
            Ok(0)
        }
        async fn recent(&self, _: i64) -> Result<Vec<RecentComment>, CommentError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_failed_submit_keeps_remote_insert_seen_meanwhile() {
        let cache = seeded_cache();
        let store = Arc::new(GatedStore {
            gate: tokio::sync::Notify::new(),
        });
        let writer = OptimisticWriter::new(
            cache.clone(),
            store.clone(),
            Arc::new(StaticSession::signed_in(alice())),
        );

        let mut remote = root();
        remote.id = "remote-1".into();
        remote.author_id = "u2".into();
        remote.content = "from another tab".into();
        remote.created_at = chrono::Utc::now().naive_utc();

        let (result, _) = tokio::join!(writer.submit(input(None, "hello")), async {
            cache.apply_event(&domain::CommentEvent::Inserted(remote.clone()));
            store.gate.notify_one();
        });
        assert!(result.unwrap_err().is_retryable());

        let key = CacheKey::threaded(&fine(), CommentSort::Thread);
        let state = cache.read(&key).unwrap();
        match state.data {
            Some(CacheValue::Threads(t)) => {
                assert!(t.iter().any(|t| t.id() == "remote-1"));
                assert!(t.iter().all(|t| !t.root.is_pending()));
                assert_eq!(t.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(state.is_stale);
        assert_eq!(
            cache.data(&CacheKey::count(&fine())),
            Some(CacheValue::Count(2))
        );
    }

    #[test]
    fn test_placeholder_ids_are_marked() {
        let a = placeholder_id();
        let b = placeholder_id();
        assert!(a.starts_with(PENDING_ID_PREFIX));
        assert_ne!(a, b);
    }
}
