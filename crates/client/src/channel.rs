use domain::{CommentEvent, FineId};
use tokio::sync::broadcast;
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamExt,
};

use crate::traits::{EventStream, PushChannel, PushMessage};

// 服务器把每次提交的写入发到这里，同时通过 SSE 推给浏览器
#[derive(Clone)]
pub struct BroadcastChannel {
    tx: broadcast::Sender<CommentEvent>,
}

impl BroadcastChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn from_sender(tx: broadcast::Sender<CommentEvent>) -> Self {
        Self { tx }
    }

    pub fn sender(&self) -> broadcast::Sender<CommentEvent> {
        self.tx.clone()
    }

    pub fn publish(&self, event: CommentEvent) {
        // 没有订阅者时发送失败是正常的
        let _ = self.tx.send(event);
    }
}

impl PushChannel for BroadcastChannel {
    fn subscribe(&self, fine_id: &FineId) -> EventStream {
        let fine_id = fine_id.clone();
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(move |result| {
            match result {
                Ok(event) if event.fine_id() == &fine_id => Some(PushMessage::Event(event)),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(n)) => Some(PushMessage::Lagged(n)),
            }
        });
        Box::pin(stream)
    }
}
