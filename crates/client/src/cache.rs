use domain::{
    Comment, CommentError, CommentFilters, CommentSort, CommentWithReplies, FineId, RecentComment,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    List,
    Threaded,
    Count,
    Detail,
    Recent,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    List {
        fine_id: FineId,
        sort: CommentSort,
        filters: CommentFilters,
    },
    Threaded {
        fine_id: FineId,
        sort: CommentSort,
    },
    Count {
        fine_id: FineId,
    },
    Detail {
        id: String,
    },
    Recent {
        limit: i64,
    },
}

impl CacheKey {
    pub fn list(fine_id: &FineId, filters: CommentFilters, sort: CommentSort) -> Self {
        CacheKey::List {
            fine_id: fine_id.clone(),
            sort,
            filters,
        }
    }

    pub fn threaded(fine_id: &FineId, sort: CommentSort) -> Self {
        CacheKey::Threaded {
            fine_id: fine_id.clone(),
            sort,
        }
    }

    pub fn count(fine_id: &FineId) -> Self {
        CacheKey::Count {
            fine_id: fine_id.clone(),
        }
    }

    pub fn detail(id: impl Into<String>) -> Self {
        CacheKey::Detail { id: id.into() }
    }

    pub fn recent(limit: i64) -> Self {
        CacheKey::Recent { limit }
    }

    pub fn kind(&self) -> QueryKind {
        match self {
            CacheKey::List { .. } => QueryKind::List,
            CacheKey::Threaded { .. } => QueryKind::Threaded,
            CacheKey::Count { .. } => QueryKind::Count,
            CacheKey::Detail { .. } => QueryKind::Detail,
            CacheKey::Recent { .. } => QueryKind::Recent,
        }
    }

    pub fn fine_id(&self) -> Option<&FineId> {
        match self {
            CacheKey::List { fine_id, .. }
            | CacheKey::Threaded { fine_id, .. }
            | CacheKey::Count { fine_id } => Some(fine_id),
            CacheKey::Detail { .. } | CacheKey::Recent { .. } => None,
        }
    }
}

// 为 None 的字段匹配任意值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPrefix {
    pub kind: Option<QueryKind>,
    pub fine_id: Option<FineId>,
}

impl KeyPrefix {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn fine(fine_id: &FineId) -> Self {
        Self {
            kind: None,
            fine_id: Some(fine_id.clone()),
        }
    }

    pub fn kind(kind: QueryKind) -> Self {
        Self {
            kind: Some(kind),
            fine_id: None,
        }
    }

    pub fn with_kind(mut self, kind: QueryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        if matches!(self.kind, Some(kind) if kind != key.kind()) {
            return false;
        }
        match &self.fine_id {
            Some(fine_id) => key.fine_id() == Some(fine_id),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Comments(Vec<Comment>),
    Threads(Vec<CommentWithReplies>),
    Count(i64),
    Comment(Comment),
    Recent(Vec<RecentComment>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryState {
    pub data: Option<CacheValue>,
    pub error: Option<CommentError>,
    pub is_fetching: bool,
    pub is_stale: bool,
}

impl QueryState {
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.is_fetching
    }

    pub fn needs_fetch(&self) -> bool {
        self.data.is_none() || self.is_stale
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub(crate) entries: Vec<(CacheKey, QueryState)>,
}

impl CacheSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
pub(crate) struct CacheState {
    pub(crate) entries: HashMap<CacheKey, QueryState>,
    // 已经计过数的软删除 id，按罚单存放；计数重新拉取后清空
    pub(crate) tombstones: HashMap<FineId, HashSet<String>>,
}

/// 查询结果的进程级缓存，clone 共享同一份数据
#[derive(Clone)]
pub struct QueryCache {
    state: Arc<RwLock<CacheState>>,
    changes: broadcast::Sender<CacheKey>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheKey> {
        self.changes.subscribe()
    }

    pub fn read(&self, key: &CacheKey) -> Option<QueryState> {
        self.lock_read().entries.get(key).cloned()
    }

    pub fn data(&self, key: &CacheKey) -> Option<CacheValue> {
        self.lock_read()
            .entries
            .get(key)
            .and_then(|state| state.data.clone())
    }

    pub fn keys_matching(&self, prefix: &KeyPrefix) -> Vec<CacheKey> {
        self.lock_read()
            .entries
            .keys()
            .filter(|k| prefix.matches(k))
            .cloned()
            .collect()
    }

    pub fn write(&self, key: CacheKey, value: CacheValue) {
        {
            let mut state = self.lock_write();
            if let CacheKey::Count { fine_id } = &key {
                state.tombstones.remove(fine_id);
            }
            let entry = state.entries.entry(key.clone()).or_default();
            entry.data = Some(value);
            entry.error = None;
            entry.is_fetching = false;
            entry.is_stale = false;
        }
        self.notify([key]);
    }

    // 不存在的键保持不存在
    pub fn patch<F>(&self, key: &CacheKey, f: F) -> bool
    where
        F: FnOnce(&mut CacheValue),
    {
        let patched = {
            let mut state = self.lock_write();
            match state.entries.get_mut(key).and_then(|e| e.data.as_mut()) {
                Some(data) => {
                    f(data);
                    true
                }
                None => false,
            }
        };
        if patched {
            self.notify([key.clone()]);
        }
        patched
    }

    pub fn patch_matching<F>(&self, prefix: &KeyPrefix, mut f: F) -> usize
    where
        F: FnMut(&CacheKey, &mut CacheValue),
    {
        let mut touched = Vec::new();
        {
            let mut state = self.lock_write();
            for (key, entry) in state.entries.iter_mut() {
                if !prefix.matches(key) {
                    continue;
                }
                if let Some(data) = entry.data.as_mut() {
                    f(key, data);
                    touched.push(key.clone());
                }
            }
        }
        let n = touched.len();
        self.notify(touched);
        n
    }

    pub fn invalidate(&self, key: &CacheKey) {
        let found = {
            let mut state = self.lock_write();
            match state.entries.get_mut(key) {
                Some(entry) => {
                    entry.is_stale = true;
                    true
                }
                None => false,
            }
        };
        if found {
            self.notify([key.clone()]);
        }
    }

    pub fn invalidate_matching(&self, prefix: &KeyPrefix) -> usize {
        let mut touched = Vec::new();
        {
            let mut state = self.lock_write();
            for (key, entry) in state.entries.iter_mut() {
                if prefix.matches(key) {
                    entry.is_stale = true;
                    touched.push(key.clone());
                }
            }
        }
        let n = touched.len();
        self.notify(touched);
        n
    }

    pub fn set_loading(&self, key: &CacheKey) {
        {
            let mut state = self.lock_write();
            let entry = state.entries.entry(key.clone()).or_default();
            entry.is_fetching = true;
        }
        self.notify([key.clone()]);
    }

    // 保留旧数据，视图可以继续显示
    pub fn set_error(&self, key: &CacheKey, error: CommentError) {
        {
            let mut state = self.lock_write();
            let entry = state.entries.entry(key.clone()).or_default();
            entry.is_fetching = false;
            entry.error = Some(error);
        }
        self.notify([key.clone()]);
    }

    pub fn remove(&self, key: &CacheKey) -> Option<QueryState> {
        let removed = self.lock_write().entries.remove(key);
        if removed.is_some() {
            self.notify([key.clone()]);
        }
        removed
    }

    pub fn snapshot(&self, prefix: &KeyPrefix) -> CacheSnapshot {
        let entries = self
            .lock_read()
            .entries
            .iter()
            .filter(|(k, _)| prefix.matches(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        CacheSnapshot { entries }
    }

    pub fn restore(&self, snapshot: CacheSnapshot) {
        let keys: Vec<CacheKey> = snapshot.entries.iter().map(|(k, _)| k.clone()).collect();
        {
            let mut state = self.lock_write();
            for (key, entry) in snapshot.entries {
                state.entries.insert(key, entry);
            }
        }
        self.notify(keys);
    }

    // 快照里的每个条目都没被别人改过
    pub fn unchanged_since(&self, snapshot: &CacheSnapshot) -> bool {
        let state = self.lock_read();
        snapshot
            .entries
            .iter()
            .all(|(key, entry)| state.entries.get(key) == Some(entry))
    }

    pub(crate) fn lock_read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, keys: impl IntoIterator<Item = CacheKey>) {
        for key in keys {
            let _ = self.changes.send(key);
        }
    }
}
