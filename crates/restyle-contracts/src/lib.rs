pub mod chat;
pub mod compare;
pub mod events;
pub mod styles;
