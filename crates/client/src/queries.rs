use domain::{
    assemble, Comment, CommentError, CommentFilters, CommentSort, CommentWithReplies, FineId,
    RecentComment,
};
use std::future::Future;
use std::sync::Arc;
use storage::{DEFAULT_LIST_LIMIT, DEFAULT_RECENT_LIMIT};
use tracing::error;

use crate::cache::{CacheKey, CacheValue, QueryCache};
use crate::traits::CommentStore;

#[derive(Clone)]
pub struct CommentQueries {
    cache: QueryCache,
    store: Arc<dyn CommentStore>,
    list_limit: i64,
}

impl CommentQueries {
    pub fn new(cache: QueryCache, store: Arc<dyn CommentStore>) -> Self {
        Self {
            cache,
            store,
            list_limit: DEFAULT_LIST_LIMIT,
        }
    }

    pub fn with_list_limit(mut self, limit: i64) -> Self {
        self.list_limit = limit.max(1);
        self
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub async fn comments(
        &self,
        fine_id: &FineId,
        filters: CommentFilters,
        sort: CommentSort,
    ) -> Result<Vec<Comment>, CommentError> {
        let key = CacheKey::list(fine_id, filters.clone(), sort);
        let value = self
            .fetch(key, async {
                self.store
                    .list(fine_id, &filters, sort, self.list_limit)
                    .await
                    .map(CacheValue::Comments)
            })
            .await?;
        match value {
            CacheValue::Comments(list) => Ok(list),
            other => Err(mismatch(other)),
        }
    }

    pub async fn threaded(
        &self,
        fine_id: &FineId,
        sort: CommentSort,
    ) -> Result<Vec<CommentWithReplies>, CommentError> {
        let key = CacheKey::threaded(fine_id, sort);
        let value = self
            .fetch(key, async {
                let filters = CommentFilters::default();
                // 线程视图按时间顺序取，再在本地组装
                let rows = self
                    .store
                    .list(fine_id, &filters, CommentSort::Oldest, self.list_limit)
                    .await?;
                Ok(CacheValue::Threads(assemble(rows, sort)))
            })
            .await?;
        match value {
            CacheValue::Threads(threads) => Ok(threads),
            other => Err(mismatch(other)),
        }
    }

    pub async fn count(&self, fine_id: &FineId) -> Result<i64, CommentError> {
        let value = self
            .fetch(CacheKey::count(fine_id), async {
                self.store.count(fine_id).await.map(CacheValue::Count)
            })
            .await?;
        match value {
            CacheValue::Count(n) => Ok(n),
            other => Err(mismatch(other)),
        }
    }

    pub async fn recent(&self, limit: Option<i64>) -> Result<Vec<RecentComment>, CommentError> {
        let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT).max(1);
        let value = self
            .fetch(CacheKey::recent(limit), async {
                self.store.recent(limit).await.map(CacheValue::Recent)
            })
            .await?;
        match value {
            CacheValue::Recent(items) => Ok(items),
            other => Err(mismatch(other)),
        }
    }

    pub async fn comment(&self, comment_id: &str) -> Result<Comment, CommentError> {
        let value = self
            .fetch(CacheKey::detail(comment_id), async {
                self.store.get(comment_id).await.map(CacheValue::Comment)
            })
            .await?;
        match value {
            CacheValue::Comment(c) => Ok(c),
            other => Err(mismatch(other)),
        }
    }

    async fn fetch(
        &self,
        key: CacheKey,
        load: impl Future<Output = Result<CacheValue, CommentError>>,
    ) -> Result<CacheValue, CommentError> {
        if let Some(state) = self.cache.read(&key) {
            if !state.needs_fetch() {
                if let Some(data) = state.data {
                    return Ok(data);
                }
            }
        }

        self.cache.set_loading(&key);
        match load.await {
            Ok(value) => {
                self.cache.write(key, value.clone());
                Ok(value)
            }
            Err(e) => {
                self.cache.set_error(&key, e.clone());
                Err(e)
            }
        }
    }
}

fn mismatch(value: CacheValue) -> CommentError {
    error!("Cache entry holds unexpected value: {:?}", value);
    CommentError::Transient("cache entry has the wrong shape".into())
}
