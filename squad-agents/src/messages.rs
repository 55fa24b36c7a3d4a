//! Message bus
//!
//! Persisted, directed messages with read tracking. Inbox reads are newest
//! first; priority is metadata for the reader, never a reordering key.

use chrono::Utc;
use squad_core::{
    short_id, AgentId, CoordinationConfig, EntityId, Message, MessageId, MessagePriority,
    SquadResult,
};
use squad_events::{EventBus, SquadEvent};
use squad_storage::{Collection, Filter, FindOptions, SortKey, Update};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

/// Handle onto the `messages` collection.
#[derive(Clone)]
pub struct MessageBus {
    messages: Collection<Message>,
    events: EventBus,
    arrivals: Arc<Notify>,
    config: CoordinationConfig,
}

impl MessageBus {
    pub fn new(messages: Collection<Message>, events: EventBus, config: CoordinationConfig) -> Self {
        Self {
            messages,
            events,
            arrivals: Arc::new(Notify::new()),
            config,
        }
    }

    /// Persist a new unread message and announce it.
    pub async fn send_message(&self, message: Message) -> SquadResult<Message> {
        let mut message = message;
        message.read_at = None;
        self.messages.insert(&message).await?;

        info!(
            from = %short_id(&message.from_agent),
            to = %short_id(&message.to_agent),
            message_type = %message.message_type,
            "Message sent"
        );
        self.events.publish(SquadEvent::message_new(
            message.message_id,
            message.from_agent,
            message.to_agent,
            message.message_type,
            &message.content,
        ));
        self.arrivals.notify_waiters();
        Ok(message)
    }

    /// Unread messages for `agent_id`, newest first, at most `limit`.
    pub async fn get_unread_messages(&self, agent_id: AgentId, limit: usize) -> SquadResult<Vec<Message>> {
        self.messages
            .find_many(
                &Filter::new().eq("to_agent", agent_id).is_null("read_at"),
                &FindOptions::new()
                    .sort(SortKey::desc("created_at"))
                    .limit(limit),
            )
            .await
    }

    /// Unread messages with the configured inbox limit.
    pub async fn get_inbox(&self, agent_id: AgentId) -> SquadResult<Vec<Message>> {
        self.get_unread_messages(agent_id, self.config.inbox_limit).await
    }

    /// Polling variant with the smaller poll limit.
    pub async fn check_inbox(&self, agent_id: AgentId) -> SquadResult<Vec<Message>> {
        self.get_unread_messages(agent_id, self.config.inbox_poll_limit)
            .await
    }

    /// Stamp `read_at` on the given messages. An empty list touches nothing.
    /// Already-read messages keep their original stamp.
    pub async fn mark_messages_as_read(&self, message_ids: &[MessageId]) -> SquadResult<u64> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let outcome = self
            .messages
            .update_many(
                &Filter::new()
                    .is_in("message_id", message_ids.iter().copied())
                    .is_null("read_at"),
                &Update::new().set("read_at", Utc::now()),
            )
            .await?;
        debug!(count = outcome.modified, "Marked messages as read");
        Ok(outcome.modified)
    }

    /// Block until `agent_id` has unread mail or `timeout` elapses. Returns
    /// whatever is unread at that point, possibly nothing.
    pub async fn wait_for_message(&self, agent_id: AgentId, timeout: Duration) -> SquadResult<Vec<Message>> {
        let deadline = Instant::now() + timeout;
        loop {
            let arrived = self.arrivals.notified();
            let unread = self.get_inbox(agent_id).await?;
            let now = Instant::now();
            if !unread.is_empty() || now >= deadline {
                return Ok(unread);
            }
            let _ = tokio::time::timeout((deadline - now).min(self.config.poll_interval), arrived).await;
        }
    }

    /// A conversation, oldest first.
    pub async fn get_thread(&self, thread_id: EntityId) -> SquadResult<Vec<Message>> {
        self.messages
            .find_many(
                &Filter::new().eq("thread_id", thread_id),
                &FindOptions::new().sort(SortKey::asc("created_at")),
            )
            .await
    }

    /// All messages across agents, newest first.
    pub async fn list_messages(&self, limit: usize) -> SquadResult<Vec<Message>> {
        self.messages
            .find_many(
                &Filter::new(),
                &FindOptions::new()
                    .sort(SortKey::desc("created_at"))
                    .limit(limit),
            )
            .await
    }
}

/// Inbox digest for prompt injection.
pub fn format_messages_for_context(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "No unread messages.".to_string();
    }
    let lines: Vec<String> = messages
        .iter()
        .map(|m| {
            let priority = if m.priority == MessagePriority::High {
                " [HIGH PRIORITY]"
            } else {
                ""
            };
            format!(
                "- From {}: [{}]{} {}",
                short_id(&m.from_agent),
                m.message_type,
                priority,
                m.content
            )
        })
        .collect();
    format!("**Inbox ({} unread):**\n{}", messages.len(), lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use squad_core::{new_entity_id, MessageType};
    use squad_storage::{Collections, InMemoryStore};

    fn bus_with_store() -> (MessageBus, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let collections = Collections::new(store.clone());
        let config = CoordinationConfig {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        (
            MessageBus::new(collections.messages, EventBus::default(), config),
            store,
        )
    }

    #[tokio::test]
    async fn test_inbox_newest_first_and_unread_only() {
        let (bus, _) = bus_with_store();
        let (a, b) = (new_entity_id(), new_entity_id());
        let first = bus
            .send_message(Message::new(a, b, "first", MessageType::Status))
            .await
            .unwrap();
        bus.send_message(Message::new(a, b, "second", MessageType::Status))
            .await
            .unwrap();
        bus.send_message(Message::new(b, a, "other inbox", MessageType::Status))
            .await
            .unwrap();

        let inbox = bus.get_unread_messages(b, 20).await.unwrap();
        let contents: Vec<_> = inbox.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "first"]);

        assert_eq!(bus.mark_messages_as_read(&[first.message_id]).await.unwrap(), 1);
        let inbox = bus.get_unread_messages(b, 20).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert!(inbox.iter().all(|m| m.read_at.is_none()));
    }

    #[tokio::test]
    async fn test_mark_empty_list_writes_nothing() {
        let (bus, store) = bus_with_store();
        let before = store.statistics();
        assert_eq!(bus.mark_messages_as_read(&[]).await.unwrap(), 0);
        assert_eq!(store.statistics().writes(), before.writes());
        assert_eq!(store.statistics().reads, before.reads);
    }

    #[tokio::test]
    async fn test_read_stamp_is_never_moved() {
        let (bus, _) = bus_with_store();
        let (a, b) = (new_entity_id(), new_entity_id());
        let sent = bus
            .send_message(Message::new(a, b, "hello", MessageType::Task))
            .await
            .unwrap();
        bus.mark_messages_as_read(&[sent.message_id]).await.unwrap();
        let stamped = bus.list_messages(10).await.unwrap()[0].read_at;
        assert!(stamped.is_some());

        assert_eq!(bus.mark_messages_as_read(&[sent.message_id]).await.unwrap(), 0);
        assert_eq!(bus.list_messages(10).await.unwrap()[0].read_at, stamped);
    }

    #[tokio::test]
    async fn test_limits() {
        let (bus, _) = bus_with_store();
        let (a, b) = (new_entity_id(), new_entity_id());
        for i in 0..12 {
            bus.send_message(Message::new(a, b, format!("m{}", i), MessageType::Status))
                .await
                .unwrap();
        }
        assert_eq!(bus.check_inbox(b).await.unwrap().len(), 10);
        assert_eq!(bus.get_inbox(b).await.unwrap().len(), 12);
        assert_eq!(bus.list_messages(5).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_thread_is_oldest_first() {
        let (bus, _) = bus_with_store();
        let (a, b, thread) = (new_entity_id(), new_entity_id(), new_entity_id());
        bus.send_message(Message::new(a, b, "ask", MessageType::Task).with_thread(thread))
            .await
            .unwrap();
        bus.send_message(Message::new(b, a, "answer", MessageType::Result).with_thread(thread))
            .await
            .unwrap();
        bus.send_message(Message::new(a, b, "unrelated", MessageType::Status))
            .await
            .unwrap();

        let thread = bus.get_thread(thread).await.unwrap();
        let contents: Vec<_> = thread.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["ask", "answer"]);
    }

    #[tokio::test]
    async fn test_wait_for_message_wakes_on_send() {
        let (bus, _) = bus_with_store();
        let (a, b) = (new_entity_id(), new_entity_id());
        let sender = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender
                .send_message(Message::new(a, b, "ping", MessageType::Status))
                .await
                .unwrap();
        });
        let got = bus.wait_for_message(b, Duration::from_secs(5)).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].content, "ping");
    }

    #[tokio::test]
    async fn test_wait_for_message_times_out_empty() {
        let (bus, _) = bus_with_store();
        let got = bus
            .wait_for_message(new_entity_id(), Duration::from_millis(30))
            .await
            .unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_send_emits_event() {
        let (bus, _) = bus_with_store();
        let mut rx = bus.events.subscribe();
        let (a, b) = (new_entity_id(), new_entity_id());
        bus.send_message(Message::new(a, b, "x".repeat(300), MessageType::Result))
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            SquadEvent::MessageNew { preview, to_agent, .. } => {
                assert_eq!(to_agent, b);
                assert_eq!(preview.len(), 100);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_format_digest() {
        let from = new_entity_id();
        let to = new_entity_id();
        let messages = vec![
            Message::new(from, to, "urgent thing", MessageType::Task).with_priority(MessagePriority::High),
            Message::new(from, to, "fyi", MessageType::Status),
        ];
        let digest = format_messages_for_context(&messages);
        let id8 = short_id(&from);
        assert_eq!(
            digest,
            format!(
                "**Inbox (2 unread):**\n- From {id8}: [task] [HIGH PRIORITY] urgent thing\n- From {id8}: [status] fyi"
            )
        );
        assert_eq!(format_messages_for_context(&[]), "No unread messages.");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn prop_unread_never_contains_read(sent in 1usize..8, read_mask in proptest::collection::vec(any::<bool>(), 8)) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let (bus, _) = bus_with_store();
                let (a, b) = (new_entity_id(), new_entity_id());
                let mut to_read = Vec::new();
                for i in 0..sent {
                    let m = bus
                        .send_message(Message::new(a, b, format!("m{}", i), MessageType::Status))
                        .await
                        .unwrap();
                    if read_mask[i] {
                        to_read.push(m.message_id);
                    }
                }
                bus.mark_messages_as_read(&to_read).await.unwrap();
                let unread = bus.get_unread_messages(b, 20).await.unwrap();
                assert_eq!(unread.len(), sent - to_read.len());
                assert!(unread.iter().all(|m| !to_read.contains(&m.message_id)));
            });
        }
    }
}
