use axum::extract::FromRef;
use domain::CommentEvent;
use std::sync::Arc;
use storage::Db;
use tokio::sync::broadcast;

use crate::config::Settings;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    // 每次写入成功后广播，SSE 连接按罚单过滤
    pub events: broadcast::Sender<CommentEvent>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(db: Db, settings: Settings) -> Self {
        let (events, _rx) = broadcast::channel(256);
        Self {
            db,
            events,
            settings: Arc::new(settings),
        }
    }

    pub fn publish(&self, event: CommentEvent) {
        let _ = self.events.send(event);
    }
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}
