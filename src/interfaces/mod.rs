pub mod chat;
pub mod gateway;
pub mod media;
pub mod telegram;
pub mod watcher;
