//! Message feed of an open conversation
//!
//! [`MessageFeed`] is the pure merge logic; [`FeedController`] wires it to a
//! backend and owns the realtime subscription for as long as the view is open.

mod controller;
mod state;

pub use controller::{Delivery, FeedController, FeedUpdate};
pub use state::{ConfirmOutcome, MessageFeed, RemoteOutcome};
