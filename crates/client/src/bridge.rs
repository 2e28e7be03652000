use domain::{CommentEvent, FineId};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{KeyPrefix, QueryCache};
use crate::traits::{PushChannel, PushMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Unsubscribed,
    Subscribed,
}

#[derive(Clone)]
pub struct LiveBridge {
    cache: QueryCache,
    channel: Arc<dyn PushChannel>,
}

impl LiveBridge {
    pub fn new(cache: QueryCache, channel: Arc<dyn PushChannel>) -> Self {
        Self { cache, channel }
    }

    pub fn subscribe(&self, fine_id: &FineId, enabled: bool) -> Subscription {
        let token = CancellationToken::new();
        let (applied, _rx) = broadcast::channel(64);
        let handle = Subscription {
            fine_id: fine_id.clone(),
            cache: self.cache.clone(),
            applied: applied.clone(),
            token: token.clone(),
        };
        if !enabled {
            token.cancel();
            return handle;
        }

        // 先同步订阅，保证返回之后发布的事件都能收到
        let mut events = self.channel.subscribe(fine_id);
        let cache = self.cache.clone();
        let task_token = token.clone();
        let task_fine = fine_id.clone();

        tokio::spawn(async move {
            info!("Live updates started for fine {}", task_fine);
            loop {
                let message = tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    message = events.next() => message,
                };
                let Some(message) = message else {
                    warn!("Push channel closed for fine {}", task_fine);
                    break;
                };
                if task_token.is_cancelled() {
                    break;
                }
                match message {
                    PushMessage::Event(event) => {
                        cache.apply_event(&event);
                        // 缓存更新之后再通知监听者
                        let _ = applied.send(event);
                    }
                    PushMessage::Lagged(n) => {
                        warn!(
                            "Skipped {} events for fine {}, invalidating its queries",
                            n, task_fine
                        );
                        cache.invalidate_matching(&KeyPrefix::fine(&task_fine));
                    }
                }
            }
            info!("Live updates stopped for fine {}", task_fine);
        });

        handle
    }
}

// drop 时自动取消订阅
pub struct Subscription {
    fine_id: FineId,
    cache: QueryCache,
    applied: broadcast::Sender<CommentEvent>,
    token: CancellationToken,
}

impl Subscription {
    pub fn fine_id(&self) -> &FineId {
        &self.fine_id
    }

    pub fn state(&self) -> BridgeState {
        if self.token.is_cancelled() {
            BridgeState::Unsubscribed
        } else {
            BridgeState::Subscribed
        }
    }

    pub fn events(&self) -> broadcast::Receiver<CommentEvent> {
        self.applied.subscribe()
    }

    pub fn refresh(&self) {
        self.cache.invalidate_matching(&KeyPrefix::fine(&self.fine_id));
    }

    pub fn unsubscribe(&self) {
        self.token.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, CacheValue};
    use crate::channel::BroadcastChannel;
    use domain::{Comment, CommentEvent, CommentSort};
    use std::time::Duration;

    fn fine(id: &str) -> FineId {
        FineId::new_unchecked(id.into())
    }

    fn comment(id: &str, fine_id: &str) -> Comment {
        let now = chrono::Utc::now().naive_utc();
        Comment {
            id: id.into(),
            fine_id: fine(fine_id),
            author_id: "u1".into(),
            author_name: "Alice".into(),
            author_username: "alice".into(),
            parent_id: None,
            content: "hello".into(),
            is_deleted: false,
            is_edited: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn count(cache: &QueryCache, fine_id: &str) -> i64 {
        match cache.data(&CacheKey::count(&fine(fine_id))) {
            Some(CacheValue::Count(n)) => n,
            _ => -1,
        }
    }

    async fn eventually<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn setup() -> (QueryCache, BroadcastChannel, LiveBridge) {
        let cache = QueryCache::new();
        let channel = BroadcastChannel::new(16);
        let bridge = LiveBridge::new(cache.clone(), Arc::new(channel.clone()));
        for id in ["f1", "f2"] {
            cache.write(CacheKey::count(&fine(id)), CacheValue::Count(0));
            cache.write(
                CacheKey::threaded(&fine(id), CommentSort::Thread),
                CacheValue::Threads(vec![]),
            );
        }
        (cache, channel, bridge)
    }

    #[tokio::test]
    async fn test_events_reach_cache_for_subscribed_fine_only() {
        let (cache, channel, bridge) = setup();
        let sub = bridge.subscribe(&fine("f1"), true);
        assert_eq!(sub.state(), BridgeState::Subscribed);

        channel.publish(CommentEvent::Inserted(comment("c2", "f2")));
        channel.publish(CommentEvent::Inserted(comment("c1", "f1")));

        assert!(eventually(|| count(&cache, "f1") == 1).await);
        assert_eq!(count(&cache, "f2"), 0);
    }

    #[tokio::test]
    async fn test_teardown_drops_later_events() {
        let (cache, channel, bridge) = setup();
        let sub = bridge.subscribe(&fine("f1"), true);

        channel.publish(CommentEvent::Inserted(comment("c1", "f1")));
        assert!(eventually(|| count(&cache, "f1") == 1).await);

        sub.unsubscribe();
        assert_eq!(sub.state(), BridgeState::Unsubscribed);
        channel.publish(CommentEvent::Inserted(comment("c2", "f1")));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(count(&cache, "f1"), 1);
    }

    #[tokio::test]
    async fn test_disabled_subscription_is_inert() {
        let (cache, channel, bridge) = setup();
        let sub = bridge.subscribe(&fine("f1"), false);
        assert_eq!(sub.state(), BridgeState::Unsubscribed);

        channel.publish(CommentEvent::Inserted(comment("c1", "f1")));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count(&cache, "f1"), 0);
    }

    #[tokio::test]
    async fn test_applied_events_are_rebroadcast() {
        let (cache, channel, bridge) = setup();
        let sub = bridge.subscribe(&fine("f1"), true);
        let mut applied = sub.events();

        channel.publish(CommentEvent::Inserted(comment("c2", "f2")));
        channel.publish(CommentEvent::Inserted(comment("c1", "f1")));

        let event = tokio::time::timeout(Duration::from_secs(1), applied.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.name(), "comment_inserted");
        assert_eq!(event.comment().id, "c1");
        // 收到通知时缓存已经更新
        assert_eq!(count(&cache, "f1"), 1);
    }

    #[tokio::test]
    async fn test_refresh_marks_fine_stale() {
        let (cache, _channel, bridge) = setup();
        let sub = bridge.subscribe(&fine("f1"), true);

        sub.refresh();

        assert!(cache.read(&CacheKey::count(&fine("f1"))).unwrap().is_stale);
        assert!(!cache.read(&CacheKey::count(&fine("f2"))).unwrap().is_stale);
    }

    #[tokio::test]
    async fn test_lag_invalidates_fine() {
        let cache = QueryCache::new();
        let channel = BroadcastChannel::new(1);
        let bridge = LiveBridge::new(cache.clone(), Arc::new(channel.clone()));
        let key = CacheKey::count(&fine("f1"));
        cache.write(key.clone(), CacheValue::Count(0));

        // 在订阅任务运行之前塞满通道
        let _sub = bridge.subscribe(&fine("f1"), true);
        channel.publish(CommentEvent::Inserted(comment("c1", "f1")));
        channel.publish(CommentEvent::Inserted(comment("c2", "f1")));
        channel.publish(CommentEvent::Inserted(comment("c3", "f1")));

        assert!(eventually(|| cache.read(&key).map(|s| s.is_stale).unwrap_or(false)).await);
    }
}
