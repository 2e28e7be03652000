pub mod comments;
pub mod fines;
pub mod profiles;
