pub mod comments;
pub mod seed;
pub mod sse;
