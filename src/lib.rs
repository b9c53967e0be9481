pub mod cache;
pub mod config;
pub mod error;
pub mod hash;
pub mod models;
pub mod server;
pub mod workspace;
pub mod ytdlp;
