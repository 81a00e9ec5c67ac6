//! bazar-core - Core library for Bazar
//!
//! This crate contains the models, the backend facade and the client logic
//! (conversation resolution, realtime message feed, listing browsing and
//! publishing) used by the Bazar command-line client.

pub mod auth;
pub mod backend;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod feed;
pub mod listings;
pub mod media;
pub mod models;
pub mod realtime;
pub mod rest;
pub mod util;

pub use error::{Error, ErrorKind, Result};
pub use models::{
    Conversation, ConversationId, FeedEntry, Listing, ListingId, Message, MessageId, UserId,
};
