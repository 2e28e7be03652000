mod commands;
mod error;
mod events;
mod models;
mod query;
mod session;
pub mod thread;

pub use commands::{CreateComment, UpdateComment, MAX_CONTENT_CHARS};
pub use error::{CommentError, Entity};
pub use events::CommentEvent;
pub use models::{
    Comment, CommentEntry, Fine, FineId, FineSummary, PendingComment, RecentComment, UserProfile,
    DELETED_MARKER, PENDING_ID_PREFIX,
};
pub use query::{CommentFilters, CommentSort, ParentFilter};
pub use session::{CurrentUser, Session, StaticSession};
pub use thread::{assemble, CommentWithReplies};
