use domain::{
    thread::sort_roots, Comment, CommentEntry, CommentEvent, CommentSort, CommentWithReplies,
    FineId, PendingComment,
};
use tracing::debug;

use crate::cache::{CacheKey, CacheState, CacheValue, KeyPrefix, QueryCache, QueryKind};

impl QueryCache {
    pub fn apply_event(&self, event: &CommentEvent) {
        debug!("Applying {} for comment {}", event.name(), event.comment().id);
        match event {
            CommentEvent::Inserted(c) => self.apply_inserted(c),
            CommentEvent::Modified(c) => {
                self.apply_replaced(c);
            }
            CommentEvent::Removed(c) => self.apply_removed(c),
        }
    }

    pub fn apply_inserted(&self, comment: &Comment) {
        let is_new = {
            let mut state = self.lock_write();
            let known = contains(&state, comment);
            if known {
                // 重复投递：按整行替换，不再计数
                replace_everywhere(&mut state, comment);
            } else {
                insert_everywhere(&mut state, comment);
            }
            !known
        };

        if is_new {
            self.adjust_count(&comment.fine_id, 1);
        }
        self.touch_fine(&comment.fine_id);
        self.invalidate_matching(&KeyPrefix::kind(QueryKind::Recent));
    }

    pub fn apply_replaced(&self, comment: &Comment) -> Option<CommentEntry> {
        let previous = {
            let mut state = self.lock_write();
            replace_everywhere(&mut state, comment)
        };
        self.touch_fine(&comment.fine_id);
        self.touch_detail(&comment.id);
        // 动态里可能还是旧内容
        self.invalidate_matching(&KeyPrefix::kind(QueryKind::Recent));
        previous
    }

    pub fn apply_removed(&self, comment: &Comment) {
        let previous = self.apply_replaced(comment);
        let first_seen = self
            .lock_write()
            .tombstones
            .entry(comment.fine_id.clone())
            .or_default()
            .insert(comment.id.clone());
        let was_live = previous.map(|p| !p.is_deleted()).unwrap_or(true);
        if comment.is_deleted && first_seen && was_live {
            self.adjust_count(&comment.fine_id, -1);
        }
    }

    // 回复放在父评论下面
    pub fn insert_pending(&self, pending: &PendingComment) {
        {
            let mut state = self.lock_write();
            for (key, entry) in state.entries.iter_mut() {
                let CacheKey::Threaded { fine_id, sort } = key else {
                    continue;
                };
                if fine_id != &pending.fine_id {
                    continue;
                }
                if let Some(CacheValue::Threads(threads)) = entry.data.as_mut() {
                    add_to_threads(threads, CommentEntry::Pending(pending.clone()), *sort);
                }
            }
        }
        self.touch_fine(&pending.fine_id);
    }

    pub fn remove_pending(&self, fine_id: &FineId, pending_id: &str) {
        {
            let mut state = self.lock_write();
            for (key, entry) in state.entries.iter_mut() {
                if key.fine_id() != Some(fine_id) {
                    continue;
                }
                if let Some(CacheValue::Threads(threads)) = entry.data.as_mut() {
                    threads.retain(|t| t.id() != pending_id);
                    for thread in threads.iter_mut() {
                        let before = thread.replies.len();
                        thread.replies.retain(|r| r.id() != pending_id);
                        if thread.replies.len() != before {
                            thread.recount();
                        }
                    }
                }
            }
        }
        self.touch_fine(fine_id);
    }

    pub fn adjust_count(&self, fine_id: &FineId, delta: i64) {
        self.patch(&CacheKey::count(fine_id), |value| {
            if let CacheValue::Count(n) = value {
                *n = (*n + delta).max(0);
            }
        });
    }

    fn touch_fine(&self, fine_id: &FineId) {
        // 只为了通知订阅者，数据已经在锁内改好
        self.patch_matching(&KeyPrefix::fine(fine_id), |_, _| {});
    }

    fn touch_detail(&self, id: &str) {
        self.patch(&CacheKey::detail(id), |_| {});
    }
}

fn contains(state: &CacheState, comment: &Comment) -> bool {
    state.entries.iter().any(|(key, entry)| {
        if key.fine_id() != Some(&comment.fine_id) {
            return false;
        }
        match entry.data.as_ref() {
            Some(CacheValue::Comments(list)) => list.iter().any(|c| c.id == comment.id),
            Some(CacheValue::Threads(threads)) => threads.iter().any(|t| {
                t.id() == comment.id || t.replies.iter().any(|r| r.id() == comment.id)
            }),
            _ => false,
        }
    })
}

fn insert_everywhere(state: &mut CacheState, comment: &Comment) {
    for (key, entry) in state.entries.iter_mut() {
        if key.fine_id() != Some(&comment.fine_id) {
            continue;
        }
        match (key, entry.data.as_mut()) {
            (CacheKey::List { sort, filters, .. }, Some(CacheValue::Comments(list))) => {
                if filters.matches(comment) {
                    insert_into_list(list, comment, *sort);
                }
            }
            (CacheKey::Threaded { sort, .. }, Some(CacheValue::Threads(threads))) => {
                threads.retain(|t| !superseded(&t.root, comment));
                for thread in threads.iter_mut() {
                    let before = thread.replies.len();
                    thread.replies.retain(|r| !superseded(r, comment));
                    if thread.replies.len() != before {
                        thread.recount();
                    }
                }
                add_to_threads(threads, CommentEntry::Confirmed(comment.clone()), *sort);
            }
            _ => {}
        }
    }
}

fn replace_everywhere(state: &mut CacheState, comment: &Comment) -> Option<CommentEntry> {
    let mut previous = None;
    for (key, entry) in state.entries.iter_mut() {
        match (key, entry.data.as_mut()) {
            (CacheKey::List { fine_id, .. }, Some(CacheValue::Comments(list)))
                if fine_id == &comment.fine_id =>
            {
                if let Some(slot) = list.iter_mut().find(|c| c.id == comment.id) {
                    let old = std::mem::replace(slot, comment.clone());
                    previous.get_or_insert(CommentEntry::Confirmed(old));
                }
            }
            (CacheKey::Threaded { fine_id, sort }, Some(CacheValue::Threads(threads)))
                if fine_id == &comment.fine_id =>
            {
                let mut changed = false;
                for thread in threads.iter_mut() {
                    if thread.id() == comment.id {
                        let old = std::mem::replace(
                            &mut thread.root,
                            CommentEntry::Confirmed(comment.clone()),
                        );
                        previous.get_or_insert(old);
                        changed = true;
                    } else if let Some(old) = thread.replace_reply(comment) {
                        previous.get_or_insert(old);
                        changed = true;
                    }
                }
                if changed {
                    sort_roots(threads, *sort);
                }
            }
            (CacheKey::Detail { id }, Some(CacheValue::Comment(current))) if id == &comment.id => {
                let old = std::mem::replace(current, comment.clone());
                previous.get_or_insert(CommentEntry::Confirmed(old));
            }
            _ => {}
        }
    }
    previous
}

fn superseded(entry: &CommentEntry, comment: &Comment) -> bool {
    matches!(entry, CommentEntry::Pending(p) if p.is_superseded_by(comment))
}

fn insert_into_list(list: &mut Vec<Comment>, comment: &Comment, sort: CommentSort) {
    match sort {
        CommentSort::Newest => list.insert(0, comment.clone()),
        CommentSort::Oldest => list.push(comment.clone()),
        CommentSort::Thread => {
            // 线程序：放在所属线程的最后一条之后，新根评论放在最后
            let thread_of = |c: &Comment| c.parent_id.clone().unwrap_or_else(|| c.id.clone());
            let target = thread_of(comment);
            let at = list
                .iter()
                .rposition(|c| thread_of(c) == target)
                .map(|i| i + 1)
                .unwrap_or(list.len());
            list.insert(at, comment.clone());
        }
    }
}

fn add_to_threads(threads: &mut Vec<CommentWithReplies>, entry: CommentEntry, sort: CommentSort) {
    match entry.parent_id().map(str::to_owned) {
        None => threads.push(CommentWithReplies::new(entry, Vec::new())),
        Some(parent) => match threads.iter_mut().find(|t| t.id() == parent) {
            Some(thread) => thread.push_reply(entry),
            None => {
                debug!("Parent {} not in view, dropping reply {}", parent, entry.id());
                return;
            }
        },
    }
    sort_roots(threads, sort);
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::CommentFilters;

    fn at(secs: i64) -> chrono::NaiveDateTime {
        chrono::DateTime::from_timestamp(secs, 0).unwrap().naive_utc()
    }

    fn fine() -> FineId {
        FineId::new_unchecked("f1".into())
    }

    fn comment(id: &str, parent: Option<&str>, secs: i64) -> Comment {
        Comment {
            id: id.into(),
            fine_id: fine(),
            author_id: "u1".into(),
            author_name: "Alice".into(),
            author_username: "alice".into(),
            parent_id: parent.map(Into::into),
            content: format!("content of {}", id),
            is_deleted: false,
            is_edited: false,
            created_at: at(secs),
            updated_at: at(secs),
        }
    }

    fn deleted(mut c: Comment) -> Comment {
        c.is_deleted = true;
        c.content = domain::DELETED_MARKER.into();
        c
    }

    fn seeded() -> QueryCache {
        let cache = QueryCache::new();
        let existing = vec![comment("a", None, 100), comment("a1", Some("a"), 150)];
        cache.write(
            CacheKey::list(&fine(), CommentFilters::default(), CommentSort::Newest),
            CacheValue::Comments(vec![existing[1].clone(), existing[0].clone()]),
        );
        cache.write(
            CacheKey::threaded(&fine(), CommentSort::Thread),
            CacheValue::Threads(domain::assemble(existing, CommentSort::Thread)),
        );
        cache.write(CacheKey::count(&fine()), CacheValue::Count(2));
        cache
    }

    fn threads(cache: &QueryCache) -> Vec<CommentWithReplies> {
        match cache.data(&CacheKey::threaded(&fine(), CommentSort::Thread)) {
            Some(CacheValue::Threads(t)) => t,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn count(cache: &QueryCache) -> i64 {
        match cache.data(&CacheKey::count(&fine())) {
            Some(CacheValue::Count(n)) => n,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_inserted_root_fans_out() {
        let cache = seeded();
        cache.apply_event(&CommentEvent::Inserted(comment("b", None, 200)));

        match cache.data(&CacheKey::list(&fine(), CommentFilters::default(), CommentSort::Newest)) {
            Some(CacheValue::Comments(list)) => assert_eq!(list[0].id, "b"),
            other => panic!("unexpected {:?}", other),
        }
        let t = threads(&cache);
        assert_eq!(t[0].id(), "b");
        assert_eq!(t[0].reply_count, 0);
        assert!(t[0].replies.is_empty());
        assert_eq!(count(&cache), 3);
    }

    #[test]
    fn test_inserted_reply_goes_under_parent() {
        let cache = seeded();
        cache.apply_event(&CommentEvent::Inserted(comment("a2", Some("a"), 300)));

        let t = threads(&cache);
        assert_eq!(t.len(), 1);
        let ids: Vec<&str> = t[0].replies.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert_eq!(t[0].reply_count, 2);
    }

    #[test]
    fn test_duplicate_insert_does_not_double_count() {
        let cache = seeded();
        let event = CommentEvent::Inserted(comment("b", None, 200));
        cache.apply_event(&event);
        cache.apply_event(&event);

        assert_eq!(count(&cache), 3);
        assert_eq!(threads(&cache).len(), 2);
    }

    #[test]
    fn test_filtered_list_skips_non_matching_insert() {
        let cache = seeded();
        let roots_key = CacheKey::list(
            &fine(),
            CommentFilters {
                parent: domain::ParentFilter::RootsOnly,
                ..Default::default()
            },
            CommentSort::Oldest,
        );
        cache.write(roots_key.clone(), CacheValue::Comments(vec![comment("a", None, 100)]));

        cache.apply_event(&CommentEvent::Inserted(comment("a2", Some("a"), 300)));
        cache.apply_event(&CommentEvent::Inserted(comment("b", None, 400)));

        match cache.data(&roots_key) {
            Some(CacheValue::Comments(list)) => {
                let ids: Vec<&str> = list.iter().map(|c| c.id.as_str()).collect();
                assert_eq!(ids, vec!["a", "b"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_thread_list_insert_keeps_thread_path() {
        let mut list = vec![
            comment("a", None, 100),
            comment("a1", Some("a"), 150),
            comment("b", None, 200),
        ];
        insert_into_list(&mut list, &comment("a2", Some("a"), 300), CommentSort::Thread);
        insert_into_list(&mut list, &comment("c", None, 400), CommentSort::Thread);

        let ids: Vec<&str> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "a1", "a2", "b", "c"]);
    }

    #[test]
    fn test_removed_decrements_once() {
        let cache = seeded();
        let gone = deleted(comment("a1", Some("a"), 150));

        cache.apply_event(&CommentEvent::Removed(gone.clone()));
        cache.apply_event(&CommentEvent::Removed(gone));

        assert_eq!(count(&cache), 1);
        let t = threads(&cache);
        assert_eq!(t[0].replies.len(), 1);
        assert_eq!(t[0].reply_count, 0);
        assert_eq!(t[0].replies[0].content(), domain::DELETED_MARKER);
    }

    #[test]
    fn test_removal_invalidates_recent_feed() {
        let cache = seeded();
        cache.write(CacheKey::recent(10), CacheValue::Recent(vec![]));

        cache.apply_event(&CommentEvent::Removed(deleted(comment("a1", Some("a"), 150))));

        assert!(cache.read(&CacheKey::recent(10)).unwrap().is_stale);
    }

    #[test]
    fn test_count_refetch_clears_tombstones() {
        let cache = seeded();
        cache.apply_event(&CommentEvent::Removed(deleted(comment("a1", Some("a"), 150))));
        assert_eq!(cache.lock_read().tombstones.get(&fine()).map(|t| t.len()), Some(1));

        cache.write(CacheKey::count(&fine()), CacheValue::Count(1));

        assert!(cache.lock_read().tombstones.get(&fine()).is_none());
        assert_eq!(count(&cache), 1);
    }

    #[test]
    fn test_count_never_negative() {
        let cache = QueryCache::new();
        cache.write(CacheKey::count(&fine()), CacheValue::Count(0));
        cache.apply_event(&CommentEvent::Removed(deleted(comment("x", None, 1))));
        assert_eq!(count(&cache), 0);
    }

    #[test]
    fn test_modified_replaces_detail() {
        let cache = seeded();
        cache.write(CacheKey::detail("a"), CacheValue::Comment(comment("a", None, 100)));

        let mut edited = comment("a", None, 100);
        edited.content = "edited".into();
        edited.is_edited = true;
        let previous = cache.apply_replaced(&edited);

        assert_eq!(previous.map(|p| p.content().to_string()), Some("content of a".into()));
        assert_eq!(cache.data(&CacheKey::detail("a")), Some(CacheValue::Comment(edited.clone())));
        assert_eq!(threads(&cache)[0].root, CommentEntry::Confirmed(edited));
        assert_eq!(count(&cache), 2);
    }

    #[test]
    fn test_pending_superseded_by_confirmed() {
        let cache = seeded();
        let confirmed = comment("a2", Some("a"), 300);
        let pending = PendingComment {
            id: "temp-1".into(),
            fine_id: fine(),
            author_id: confirmed.author_id.clone(),
            author_name: confirmed.author_name.clone(),
            author_username: confirmed.author_username.clone(),
            parent_id: confirmed.parent_id.clone(),
            content: confirmed.content.clone(),
            created_at: at(299),
            updated_at: at(299),
        };

        cache.insert_pending(&pending);
        assert!(threads(&cache)[0].replies.iter().any(|r| r.is_pending()));

        cache.apply_event(&CommentEvent::Inserted(confirmed));
        let t = threads(&cache);
        let ids: Vec<&str> = t[0].replies.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
    }
}
