pub mod chat;
pub mod daily_update;
pub mod task;
pub mod user;
