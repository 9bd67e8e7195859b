pub mod auth;
pub mod download;
pub mod drive;
pub mod hash;
pub mod operations;
pub mod scheduler;
pub mod walker;
