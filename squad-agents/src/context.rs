//! Context packets
//!
//! Everything an agent needs for its next completion call, gathered in one
//! place: who it is, what it was asked, what is waiting in its inbox, and
//! where it left off.

use crate::squad::Squad;
use serde::Serialize;
use squad_core::{AgentId, AgentRole, Message, Specialization, SquadResult};
use squad_llm::estimate_tokens;

/// Unread messages pulled into a packet when no limit is given.
pub const DEFAULT_PACKET_MESSAGES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPacketInput {
    pub agent_id: AgentId,
    pub task: String,
    pub include_checkpoint: bool,
    pub max_messages: Option<usize>,
}

impl ContextPacketInput {
    pub fn new(agent_id: AgentId, task: impl Into<String>) -> Self {
        Self {
            agent_id,
            task: task.into(),
            include_checkpoint: false,
            max_messages: None,
        }
    }

    pub fn with_checkpoint(mut self) -> Self {
        self.include_checkpoint = true;
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = Some(max_messages);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPacket {
    pub agent_id: AgentId,
    /// `None` when the agent is not registered
    pub agent_type: Option<AgentRole>,
    pub specialization: Option<Specialization>,
    pub task: String,
    pub unread_messages: Vec<Message>,
    pub resume_context: Option<String>,
    /// Estimated over the serialized packet itself
    pub token_estimate: i64,
}

impl Squad {
    pub async fn build_context_packet(&self, input: ContextPacketInput) -> SquadResult<ContextPacket> {
        let agent = self.registry().get_agent(input.agent_id).await?;
        let unread_messages = self
            .messages()
            .get_unread_messages(
                input.agent_id,
                input.max_messages.unwrap_or(DEFAULT_PACKET_MESSAGES),
            )
            .await?;
        let resume_context = if input.include_checkpoint {
            self.checkpoints().get_resume_context(input.agent_id).await?
        } else {
            None
        };

        let mut packet = ContextPacket {
            agent_id: input.agent_id,
            agent_type: agent.as_ref().map(|a| a.role),
            specialization: agent.as_ref().and_then(|a| a.specialization),
            task: input.task,
            unread_messages,
            resume_context,
            token_estimate: 0,
        };
        packet.token_estimate = serde_json::to_string(&packet)
            .map(|json| estimate_tokens(&json))
            .unwrap_or_default();
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AgentConfig;
    use squad_core::{new_entity_id, CheckpointSummary, MessageType, ResumePointer};
    use squad_llm::MockRunner;
    use squad_storage::InMemoryStore;
    use std::sync::Arc;

    fn squad() -> Squad {
        Squad::builder(Arc::new(InMemoryStore::new()), Arc::new(MockRunner::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_packet_for_unknown_agent() {
        let squad = squad();
        let agent_id = new_entity_id();
        let packet = squad
            .build_context_packet(ContextPacketInput::new(agent_id, "do it"))
            .await
            .unwrap();
        assert_eq!(packet.agent_type, None);
        assert_eq!(packet.specialization, None);
        assert!(packet.unread_messages.is_empty());
        assert_eq!(packet.resume_context, None);
        assert!(packet.token_estimate > 0);
    }

    #[tokio::test]
    async fn test_packet_collects_inbox_and_checkpoint() {
        let squad = squad();
        let director = squad.initialize_agent(AgentConfig::director()).await.unwrap();
        let specialist = squad
            .initialize_agent(AgentConfig::specialist(
                director.agent_id(),
                Specialization::Researcher,
            ))
            .await
            .unwrap();
        for i in 0..12 {
            squad
                .messages()
                .send_message(squad_core::Message::new(
                    director.agent_id(),
                    specialist.agent_id(),
                    format!("note {}", i),
                    MessageType::Status,
                ))
                .await
                .unwrap();
        }
        squad
            .checkpoints()
            .create_checkpoint(
                specialist.agent_id(),
                CheckpointSummary::new("Survey sources"),
                ResumePointer::new("Summarize", "executing"),
                10,
            )
            .await
            .unwrap();

        let without = squad
            .build_context_packet(ContextPacketInput::new(specialist.agent_id(), "t"))
            .await
            .unwrap();
        assert_eq!(without.unread_messages.len(), DEFAULT_PACKET_MESSAGES);
        assert_eq!(without.resume_context, None);
        assert_eq!(without.agent_type, Some(AgentRole::Specialist));
        assert_eq!(without.specialization, Some(Specialization::Researcher));

        let with = squad
            .build_context_packet(
                ContextPacketInput::new(specialist.agent_id(), "t")
                    .with_checkpoint()
                    .with_max_messages(3),
            )
            .await
            .unwrap();
        assert_eq!(with.unread_messages.len(), 3);
        assert!(with
            .resume_context
            .as_deref()
            .is_some_and(|c| c.contains("Survey sources")));
        assert!(with.token_estimate > 0);
    }
}
