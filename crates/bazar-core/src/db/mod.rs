//! Embedded libSQL store backing local mode

mod connection;
mod migrations;

pub use connection::Database;
