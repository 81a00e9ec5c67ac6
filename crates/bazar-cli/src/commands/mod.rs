pub mod auth_cmd;
pub mod browse;
pub mod chat;
pub mod common;
pub mod completions;
pub mod config;
pub mod contact;
pub mod sell;
