//! Checkpoint & resume protocol
//!
//! Checkpoints are append-only. Resume reads the latest one for an agent,
//! ordered by `created_at` and then by the per-agent `sequence`.

use chrono::Utc;
use squad_core::{
    new_entity_id, short_id, AgentId, Checkpoint, CheckpointSummary, ResumePointer, SquadResult,
};
use squad_events::{EventBus, SquadEvent};
use squad_storage::{Collection, Filter, FindOptions, SortKey};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Latest checkpoint and its rendered briefing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResumeState {
    pub checkpoint: Option<Checkpoint>,
    pub resume_context: Option<String>,
}

/// Handle onto the `checkpoints` collection.
#[derive(Clone)]
pub struct CheckpointStore {
    checkpoints: Collection<Checkpoint>,
    events: EventBus,
    /// Serializes sequence allocation with the insert that uses it.
    writer: Arc<Mutex<()>>,
}

fn latest_first() -> [SortKey; 2] {
    [SortKey::desc("created_at"), SortKey::desc("sequence")]
}

impl CheckpointStore {
    pub fn new(checkpoints: Collection<Checkpoint>, events: EventBus) -> Self {
        Self {
            checkpoints,
            events,
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Append a checkpoint for `agent_id`.
    pub async fn create_checkpoint(
        &self,
        agent_id: AgentId,
        summary: CheckpointSummary,
        resume_pointer: ResumePointer,
        tokens_used: i64,
    ) -> SquadResult<Checkpoint> {
        let _guard = self.writer.lock().await;
        let sequence = self
            .checkpoints
            .find_one(
                &Filter::new().eq("agent_id", agent_id),
                &[SortKey::desc("sequence")],
            )
            .await?
            .map_or(0, |c| c.sequence + 1);

        let checkpoint = Checkpoint {
            checkpoint_id: new_entity_id(),
            agent_id,
            summary,
            resume_pointer,
            tokens_used,
            sequence,
            created_at: Utc::now(),
        };
        self.checkpoints.insert(&checkpoint).await?;

        info!(
            agent_id = %short_id(&agent_id),
            phase = %checkpoint.resume_pointer.phase,
            sequence = sequence,
            "Checkpoint created"
        );
        self.events.publish(SquadEvent::CheckpointNew {
            checkpoint_id: checkpoint.checkpoint_id,
            agent_id,
            phase: checkpoint.resume_pointer.phase.clone(),
            timestamp: checkpoint.created_at,
        });
        Ok(checkpoint)
    }

    /// Most recent checkpoint for the agent.
    pub async fn latest(&self, agent_id: AgentId) -> SquadResult<Option<Checkpoint>> {
        self.checkpoints
            .find_one(&Filter::new().eq("agent_id", agent_id), &latest_first())
            .await
    }

    /// All checkpoints for the agent, latest first.
    pub async fn list(&self, agent_id: AgentId) -> SquadResult<Vec<Checkpoint>> {
        let mut options = FindOptions::new();
        for key in latest_first() {
            options = options.sort(key);
        }
        self.checkpoints
            .find_many(&Filter::new().eq("agent_id", agent_id), &options)
            .await
    }

    pub async fn resume_from_checkpoint(&self, agent_id: AgentId) -> SquadResult<ResumeState> {
        let checkpoint = self.latest(agent_id).await?;
        let resume_context = checkpoint.as_ref().map(render_resume_context);
        if let Some(c) = &checkpoint {
            info!(agent_id = %short_id(&agent_id), phase = %c.resume_pointer.phase, "Resuming from checkpoint");
        }
        Ok(ResumeState {
            checkpoint,
            resume_context,
        })
    }

    /// Rendered briefing from the latest checkpoint, `None` when the agent
    /// has never checkpointed.
    pub async fn get_resume_context(&self, agent_id: AgentId) -> SquadResult<Option<String>> {
        Ok(self.latest(agent_id).await?.as_ref().map(render_resume_context))
    }
}

fn push_list(lines: &mut Vec<String>, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(heading.to_string());
    lines.extend(items.iter().map(|item| format!("- {}", item)));
    lines.push(String::new());
}

/// Render a checkpoint as the briefing injected into the agent's next run.
pub fn render_resume_context(checkpoint: &Checkpoint) -> String {
    let summary = &checkpoint.summary;
    let pointer = &checkpoint.resume_pointer;

    let mut lines = vec![
        "## Resuming from Checkpoint".to_string(),
        String::new(),
        format!("**Goal:** {}", summary.goal),
        String::new(),
    ];
    push_list(&mut lines, "**Completed:**", &summary.completed);
    push_list(&mut lines, "**Pending:**", &summary.pending);
    push_list(&mut lines, "**Key Decisions:**", &summary.decisions);

    lines.push(format!("**Next Action:** {}", pointer.next_action));
    lines.push(format!("**Phase:** {}", pointer.phase));
    if let Some(context) = pointer.current_context.as_deref().filter(|c| !c.is_empty()) {
        lines.push(format!("**Context:** {}", context));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use squad_storage::{Collections, InMemoryStore};

    fn store() -> CheckpointStore {
        let collections = Collections::new(Arc::new(InMemoryStore::new()));
        CheckpointStore::new(collections.checkpoints, EventBus::default())
    }

    #[test]
    fn test_render_full_briefing() {
        let checkpoint = Checkpoint {
            checkpoint_id: new_entity_id(),
            agent_id: new_entity_id(),
            summary: CheckpointSummary::new("Write report")
                .with_completed(["Outline"])
                .with_pending(["Draft", "Edit"])
                .with_decisions(["Use bullet points"]),
            resume_pointer: ResumePointer::new("Draft section 2", "drafting")
                .with_context("Section 1 done"),
            tokens_used: 10,
            sequence: 0,
            created_at: Utc::now(),
        };
        assert_eq!(
            render_resume_context(&checkpoint),
            "## Resuming from Checkpoint\n\n**Goal:** Write report\n\n\
             **Completed:**\n- Outline\n\n\
             **Pending:**\n- Draft\n- Edit\n\n\
             **Key Decisions:**\n- Use bullet points\n\n\
             **Next Action:** Draft section 2\n**Phase:** drafting\n**Context:** Section 1 done"
        );
    }

    #[test]
    fn test_render_omits_empty_lists() {
        let checkpoint = Checkpoint {
            checkpoint_id: new_entity_id(),
            agent_id: new_entity_id(),
            summary: CheckpointSummary::new("Goal"),
            resume_pointer: ResumePointer::new("Start", "init"),
            tokens_used: 0,
            sequence: 0,
            created_at: Utc::now(),
        };
        assert_eq!(
            render_resume_context(&checkpoint),
            "## Resuming from Checkpoint\n\n**Goal:** Goal\n\n**Next Action:** Start\n**Phase:** init"
        );
    }

    #[tokio::test]
    async fn test_no_checkpoint_means_fresh_start() {
        let store = store();
        let agent = new_entity_id();
        assert_eq!(store.get_resume_context(agent).await.unwrap(), None);
        assert_eq!(store.resume_from_checkpoint(agent).await.unwrap(), ResumeState::default());
    }

    #[tokio::test]
    async fn test_latest_wins_and_sequence_increments() {
        let store = store();
        let agent = new_entity_id();
        let first = store
            .create_checkpoint(agent, CheckpointSummary::new("g"), ResumePointer::new("one", "p1"), 5)
            .await
            .unwrap();
        let second = store
            .create_checkpoint(agent, CheckpointSummary::new("g"), ResumePointer::new("two", "p2"), 5)
            .await
            .unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);

        let context = store.get_resume_context(agent).await.unwrap().unwrap();
        assert!(context.contains("**Next Action:** two"));
        assert!(context.contains("**Phase:** p2"));
        assert_eq!(store.list(agent).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_latest_by_created_at_even_if_inserted_out_of_order() {
        let store = store();
        let agent = new_entity_id();
        let now = Utc::now();
        let newer = Checkpoint {
            checkpoint_id: new_entity_id(),
            agent_id: agent,
            summary: CheckpointSummary::new("newest goal"),
            resume_pointer: ResumePointer::new("finish", "late"),
            tokens_used: 0,
            sequence: 0,
            created_at: now,
        };
        let older = Checkpoint {
            checkpoint_id: new_entity_id(),
            summary: CheckpointSummary::new("old goal"),
            resume_pointer: ResumePointer::new("begin", "early"),
            sequence: 1,
            created_at: now - Duration::minutes(5),
            ..newer.clone()
        };
        store.checkpoints.insert(&newer).await.unwrap();
        store.checkpoints.insert(&older).await.unwrap();

        let latest = store.latest(agent).await.unwrap().unwrap();
        assert_eq!(latest.checkpoint_id, newer.checkpoint_id);
    }

    #[tokio::test]
    async fn test_sequence_breaks_timestamp_ties() {
        let store = store();
        let agent = new_entity_id();
        let at = Utc::now();
        let base = Checkpoint {
            checkpoint_id: new_entity_id(),
            agent_id: agent,
            summary: CheckpointSummary::new("g"),
            resume_pointer: ResumePointer::new("a", "first"),
            tokens_used: 0,
            sequence: 3,
            created_at: at,
        };
        let tied = Checkpoint {
            checkpoint_id: new_entity_id(),
            resume_pointer: ResumePointer::new("b", "second"),
            sequence: 2,
            ..base.clone()
        };
        store.checkpoints.insert(&tied).await.unwrap();
        store.checkpoints.insert(&base).await.unwrap();
        assert_eq!(store.latest(agent).await.unwrap().unwrap().sequence, 3);
    }

    #[tokio::test]
    async fn test_rejects_negative_tokens() {
        let store = store();
        let result = store
            .create_checkpoint(new_entity_id(), CheckpointSummary::new("g"), ResumePointer::new("n", "p"), -1)
            .await;
        assert!(result.is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_briefing_names_goal_action_phase(
            goal in "[a-zA-Z][a-zA-Z ]{0,30}",
            next in "[a-zA-Z][a-zA-Z ]{0,30}",
            phase in "[a-z]{1,12}",
        ) {
            let checkpoint = Checkpoint {
                checkpoint_id: new_entity_id(),
                agent_id: new_entity_id(),
                summary: CheckpointSummary::new(goal.clone()),
                resume_pointer: ResumePointer::new(next.clone(), phase.clone()),
                tokens_used: 0,
                sequence: 0,
                created_at: Utc::now(),
            };
            let rendered = render_resume_context(&checkpoint);
            let goal_line = format!("**Goal:** {}", goal);
            let next_line = format!("**Next Action:** {}", next);
            let phase_line = format!("**Phase:** {}", phase);
            prop_assert!(rendered.contains(&goal_line));
            prop_assert!(rendered.contains(&next_line));
            prop_assert!(rendered.contains(&phase_line));
        }
    }
}
