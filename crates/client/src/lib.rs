mod bridge;
mod cache;
mod channel;
mod coordinator;
mod fanout;
mod queries;
mod store;
mod traits;

pub use bridge::{BridgeState, LiveBridge, Subscription};
pub use cache::{CacheKey, CacheSnapshot, CacheValue, KeyPrefix, QueryCache, QueryKind, QueryState};
pub use channel::BroadcastChannel;
pub use coordinator::{OptimisticWriter, DEFAULT_REQUEST_TIMEOUT};
pub use queries::CommentQueries;
pub use store::LocalStore;
pub use traits::{CommentStore, EventStream, PushChannel, PushMessage};
