//! Ordered message view with optimistic entries.

use crate::models::{ConversationId, FeedEntry, Message, MessageId, PendingMessage, TempId, UserId};
use crate::{Error, Result};

/// What a realtime insert did to the view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// New entry at this index
    Inserted(usize),
    /// Our own pending entry at this index was confirmed by the realtime copy
    Reconciled(usize),
    /// Already present by id
    Duplicate,
}

/// What a send confirmation did to the view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Pending entry replaced in place
    Replaced(usize),
    /// Pending entry dropped because the confirmed copy was already shown
    Superseded,
    /// Pending entry was gone; the confirmed message was inserted
    Inserted(usize),
    /// Nothing to do
    Unchanged,
}

/// The rendered list of one conversation.
///
/// Holds confirmed messages in creation order plus pending local echoes.
/// No two entries ever represent the same logical message.
#[derive(Debug, Clone)]
pub struct MessageFeed {
    conversation: ConversationId,
    viewer: UserId,
    entries: Vec<FeedEntry>,
}

impl MessageFeed {
    pub const fn new(conversation: ConversationId, viewer: UserId) -> Self {
        Self {
            conversation,
            viewer,
            entries: Vec::new(),
        }
    }

    pub const fn conversation(&self) -> ConversationId {
        self.conversation
    }

    pub const fn viewer(&self) -> UserId {
        self.viewer
    }

    pub fn entries(&self) -> &[FeedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_pending()).count()
    }

    /// Merge fetched history. Messages already shown are skipped.
    pub fn load_history(&mut self, mut history: Vec<Message>) {
        history.sort_by_key(|message| message.created_at);
        for message in history {
            if message.conversation_id == self.conversation && !self.contains(message.id) {
                self.insert_ordered(message);
            }
        }
    }

    /// Merge a message delivered by the realtime channel.
    pub fn apply_remote(&mut self, message: Message) -> RemoteOutcome {
        if message.conversation_id != self.conversation || self.contains(message.id) {
            return RemoteOutcome::Duplicate;
        }

        // The realtime copy of our own send can beat the insert response.
        if message.sender_id == self.viewer {
            if let Some(index) = self.entries.iter().position(|entry| {
                matches!(entry, FeedEntry::Pending(pending) if pending.content == message.content)
            }) {
                self.entries[index] = FeedEntry::Confirmed(message);
                return RemoteOutcome::Reconciled(index);
            }
        }

        RemoteOutcome::Inserted(self.insert_ordered(message))
    }

    /// Append a pending echo for `text`. Whitespace-only text is refused.
    pub fn begin_send(&mut self, text: &str) -> Result<PendingMessage> {
        if text.trim().is_empty() {
            return Err(Error::validation("Message is empty"));
        }
        let pending = PendingMessage::new(self.conversation, self.viewer, text.to_string());
        self.entries.push(FeedEntry::Pending(pending.clone()));
        Ok(pending)
    }

    /// Reconcile the pending entry `temp_id` with the stored `message`.
    pub fn confirm(&mut self, temp_id: TempId, message: Message) -> ConfirmOutcome {
        let pending_index = self.pending_index(temp_id);
        let already_shown = self.contains(message.id);

        match (pending_index, already_shown) {
            (Some(index), false) => {
                self.entries[index] = FeedEntry::Confirmed(message);
                ConfirmOutcome::Replaced(index)
            }
            (Some(index), true) => {
                self.entries.remove(index);
                ConfirmOutcome::Superseded
            }
            (None, false) => ConfirmOutcome::Inserted(self.insert_ordered(message)),
            (None, true) => ConfirmOutcome::Unchanged,
        }
    }

    /// Drop the pending entry after a failed insert. Returns whether it was present.
    pub fn fail(&mut self, temp_id: TempId) -> bool {
        match self.pending_index(temp_id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    fn contains(&self, id: MessageId) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.message_id() == Some(id))
    }

    fn pending_index(&self, temp_id: TempId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.temp_id() == Some(temp_id))
    }

    /// Insert after every entry created at or before `message`.
    fn insert_ordered(&mut self, message: Message) -> usize {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.created_at() > message.created_at)
            .unwrap_or(self.entries.len());
        self.entries.insert(index, FeedEntry::Confirmed(message));
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    struct Fixture {
        conversation: ConversationId,
        me: UserId,
        them: UserId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                conversation: ConversationId::new(),
                me: UserId::new(),
                them: UserId::new(),
            }
        }

        fn feed(&self) -> MessageFeed {
            MessageFeed::new(self.conversation, self.me)
        }

        fn message(&self, sender: UserId, content: &str, second: i64) -> Message {
            Message {
                id: MessageId::new(),
                conversation_id: self.conversation,
                sender_id: sender,
                content: content.to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
                    + Duration::seconds(second),
            }
        }
    }

    fn contents(feed: &MessageFeed) -> Vec<&str> {
        feed.entries().iter().map(FeedEntry::content).collect()
    }

    #[test]
    fn history_is_ordered_by_creation_time() {
        let fx = Fixture::new();
        let mut feed = fx.feed();
        feed.load_history(vec![
            fx.message(fx.them, "third", 3),
            fx.message(fx.me, "first", 1),
            fx.message(fx.them, "second", 2),
        ]);
        assert_eq!(contents(&feed), vec!["first", "second", "third"]);
    }

    #[test]
    fn remote_messages_are_ordered_regardless_of_delivery_order() {
        let fx = Fixture::new();
        let messages: Vec<_> = (1..=5)
            .map(|second| fx.message(fx.them, &format!("m{second}"), second))
            .collect();

        for order in [[4, 0, 3, 1, 2], [0, 1, 2, 3, 4], [4, 3, 2, 1, 0]] {
            let mut feed = fx.feed();
            for index in order {
                feed.apply_remote(messages[index].clone());
            }
            assert_eq!(contents(&feed), vec!["m1", "m2", "m3", "m4", "m5"]);
        }
    }

    #[test]
    fn older_remote_message_lands_before_pending_echo() {
        let fx = Fixture::new();
        let mut feed = fx.feed();
        feed.load_history(vec![fx.message(fx.them, "still available?", 1)]);
        let pending = feed.begin_send("yes, pick up today").unwrap();

        // written on the server before our send left the client
        assert_eq!(
            feed.apply_remote(fx.message(fx.them, "can you do 50?", 2)),
            RemoteOutcome::Inserted(1)
        );
        assert_eq!(
            contents(&feed),
            vec!["still available?", "can you do 50?", "yes, pick up today"]
        );
        assert!(feed.entries()[2].is_pending());

        let mut later = fx.message(fx.them, "see you", 0);
        later.created_at = pending.created_at + Duration::seconds(30);
        assert_eq!(feed.apply_remote(later), RemoteOutcome::Inserted(3));

        let stored = fx.message(fx.me, "yes, pick up today", 3);
        assert_eq!(
            feed.confirm(pending.temp_id, stored),
            ConfirmOutcome::Replaced(2)
        );
        assert_eq!(feed.pending_count(), 0);
        assert_eq!(feed.len(), 4);
    }

    #[test]
    fn equal_timestamps_keep_delivery_order() {
        let fx = Fixture::new();
        let mut feed = fx.feed();
        feed.apply_remote(fx.message(fx.them, "a", 1));
        feed.apply_remote(fx.message(fx.them, "b", 1));
        assert_eq!(contents(&feed), vec!["a", "b"]);
    }

    #[test]
    fn duplicate_delivery_is_ignored() {
        let fx = Fixture::new();
        let mut feed = fx.feed();
        let message = fx.message(fx.them, "hello", 1);
        feed.load_history(vec![message.clone()]);

        assert_eq!(feed.apply_remote(message.clone()), RemoteOutcome::Duplicate);
        assert_eq!(feed.apply_remote(message), RemoteOutcome::Duplicate);
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn other_conversations_are_ignored() {
        let fx = Fixture::new();
        let mut feed = fx.feed();
        let mut stray = fx.message(fx.them, "wrong room", 1);
        stray.conversation_id = ConversationId::new();
        assert_eq!(feed.apply_remote(stray), RemoteOutcome::Duplicate);
        assert!(feed.is_empty());
    }

    #[test]
    fn blank_text_is_refused_locally() {
        let fx = Fixture::new();
        let mut feed = fx.feed();
        assert!(matches!(feed.begin_send("  \n\t"), Err(Error::Validation(_))));
        assert!(feed.is_empty());
    }

    #[test]
    fn optimistic_send_round_trip_leaves_one_entry() {
        let fx = Fixture::new();
        let mut feed = fx.feed();
        feed.load_history(vec![fx.message(fx.them, "hi", 1)]);

        let pending = feed.begin_send("hello back").unwrap();
        assert_eq!(feed.pending_count(), 1);
        assert_eq!(contents(&feed), vec!["hi", "hello back"]);

        let stored = fx.message(fx.me, "hello back", 2);
        assert_eq!(
            feed.confirm(pending.temp_id, stored.clone()),
            ConfirmOutcome::Replaced(1)
        );
        assert_eq!(feed.pending_count(), 0);
        assert_eq!(feed.entries()[1], FeedEntry::Confirmed(stored.clone()));

        // Realtime echo of the same row arrives afterwards
        assert_eq!(feed.apply_remote(stored), RemoteOutcome::Duplicate);
        assert_eq!(feed.len(), 2);
    }

    #[test]
    fn realtime_copy_before_insert_response_reconciles_pending() {
        let fx = Fixture::new();
        let mut feed = fx.feed();
        let pending = feed.begin_send("on my way").unwrap();
        let stored = fx.message(fx.me, "on my way", 1);

        assert_eq!(
            feed.apply_remote(stored.clone()),
            RemoteOutcome::Reconciled(0)
        );
        assert_eq!(feed.confirm(pending.temp_id, stored), ConfirmOutcome::Unchanged);
        assert_eq!(contents(&feed), vec!["on my way"]);
        assert_eq!(feed.pending_count(), 0);
    }

    #[test]
    fn reconciliation_takes_oldest_matching_pending() {
        let fx = Fixture::new();
        let mut feed = fx.feed();
        let first = feed.begin_send("ok").unwrap();
        let second = feed.begin_send("ok").unwrap();

        let stored_first = fx.message(fx.me, "ok", 1);
        assert_eq!(
            feed.apply_remote(stored_first.clone()),
            RemoteOutcome::Reconciled(0)
        );
        assert_eq!(feed.entries()[1].temp_id(), Some(second.temp_id));

        assert_eq!(feed.confirm(first.temp_id, stored_first), ConfirmOutcome::Unchanged);
        let stored_second = fx.message(fx.me, "ok", 2);
        assert_eq!(
            feed.confirm(second.temp_id, stored_second),
            ConfirmOutcome::Replaced(1)
        );
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.pending_count(), 0);
    }

    #[test]
    fn confirmation_for_message_shown_elsewhere_drops_pending() {
        let fx = Fixture::new();
        let mut feed = fx.feed();
        let stored = fx.message(fx.me, "edited elsewhere", 1);
        feed.load_history(vec![stored.clone()]);
        let pending = feed.begin_send("typed again").unwrap();

        assert_eq!(
            feed.confirm(pending.temp_id, stored),
            ConfirmOutcome::Superseded
        );
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn failed_send_removes_pending_and_resend_is_not_duplicated() {
        let fx = Fixture::new();
        let mut feed = fx.feed();
        let failed = feed.begin_send("are you there?").unwrap();
        assert!(feed.fail(failed.temp_id));
        assert!(feed.is_empty());
        assert!(!feed.fail(failed.temp_id));

        let retry = feed.begin_send("are you there?").unwrap();
        let stored = fx.message(fx.me, "are you there?", 5);
        feed.confirm(retry.temp_id, stored.clone());
        feed.apply_remote(stored);
        assert_eq!(contents(&feed), vec!["are you there?"]);
    }

    #[test]
    fn others_identical_text_does_not_touch_my_pending() {
        let fx = Fixture::new();
        let mut feed = fx.feed();
        feed.begin_send("hi").unwrap();
        assert_eq!(
            feed.apply_remote(fx.message(fx.them, "hi", 1)),
            RemoteOutcome::Inserted(0)
        );
        assert_eq!(feed.pending_count(), 1);
    }
}
