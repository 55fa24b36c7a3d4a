//! Director role
//!
//! Decomposes a goal, spawns one specialist per subtask, hands out the
//! work, waits for it and stitches the results together.

use crate::context::ContextPacketInput;
use crate::registry::{AgentConfig, AgentContext};
use crate::squad::Squad;
use serde::{Deserialize, Serialize};
use squad_core::{
    short_id, AgentId, AgentRole, AgentStatus, CheckpointSummary, Message, MessageType,
    ResumePointer, Specialization, SquadResult, Task, TaskId, TaskStatus,
};
use squad_llm::RunConfig;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Characters of the goal kept as the root task title.
const ROOT_TITLE_CHARS: usize = 100;

/// A subtask handed to a specialist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub title: String,
    pub description: String,
}

impl TaskAssignment {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

fn decompose_prompt(task: &str) -> String {
    format!(
        "Analyze this task and break it down into 2-3 subtasks that can be assigned to specialist agents.

Task: {task}

For each subtask, provide:
1. A clear title
2. A detailed description of what needs to be done

Format your response as JSON array:
[
  {{\"title\": \"Subtask 1 Title\", \"description\": \"Detailed description...\"}},
  {{\"title\": \"Subtask 2 Title\", \"description\": \"Detailed description...\"}}
]

Only output the JSON array, nothing else."
    )
}

/// Parse a decomposition reply. Accepts the bare array or an array wrapped
/// in surrounding prose or code fences; entries without a title are dropped.
pub fn parse_subtasks(content: &str) -> Option<Vec<TaskAssignment>> {
    let trimmed = content.trim();
    let parsed = serde_json::from_str::<Vec<TaskAssignment>>(trimmed).ok().or_else(|| {
        let start = trimmed.find('[')?;
        let end = trimmed.rfind(']')?;
        if end <= start {
            return None;
        }
        serde_json::from_str::<Vec<TaskAssignment>>(&trimmed[start..=end]).ok()
    })?;
    let subtasks: Vec<TaskAssignment> = parsed
        .into_iter()
        .filter(|s| !s.title.trim().is_empty())
        .collect();
    (!subtasks.is_empty()).then_some(subtasks)
}

/// Pick a specialist type from keywords in a subtask title.
pub fn determine_specialization(title: &str) -> Specialization {
    let lower = title.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&["research", "find", "discover"]) {
        Specialization::Researcher
    } else if has(&["write", "document", "draft"]) {
        Specialization::Writer
    } else if has(&["analyze", "review", "evaluate"]) {
        Specialization::Analyst
    } else {
        Specialization::General
    }
}

/// Render completed results as titled sections separated by rules. Failed
/// and unfinished tasks are left out.
pub fn aggregate_results(tasks: &[Task]) -> String {
    tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .filter_map(|t| {
            t.result
                .as_ref()
                .filter(|r| !r.is_empty())
                .map(|r| format!("## {}\n\n{}", t.title, r))
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

impl Squad {
    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    pub async fn create_director(&self) -> SquadResult<AgentContext> {
        let mut ctx = self.initialize_agent(AgentConfig::director()).await?;
        ctx.agent = self.provision_sandbox(ctx.agent).await?;
        info!(agent_id = %short_id(&ctx.agent_id()), "Director created");
        Ok(ctx)
    }

    pub async fn spawn_specialist(
        &self,
        director_id: AgentId,
        specialization: Specialization,
    ) -> SquadResult<AgentContext> {
        let mut ctx = self
            .initialize_agent(AgentConfig::specialist(director_id, specialization))
            .await?;
        ctx.agent = self.provision_sandbox(ctx.agent).await?;
        info!(
            director_id = %short_id(&director_id),
            agent_id = %short_id(&ctx.agent_id()),
            specialization = %specialization,
            "Spawned specialist"
        );
        Ok(ctx)
    }

    // ========================================================================
    // TASK MANAGEMENT
    // ========================================================================

    /// Create a task, assign it and send the specialist a `task` message
    /// threaded on the task id.
    pub async fn assign_task_to_specialist(
        &self,
        director_id: AgentId,
        specialist_id: AgentId,
        assignment: &TaskAssignment,
        parent_task_id: Option<TaskId>,
    ) -> SquadResult<Task> {
        let task = self
            .tasks()
            .create_task(&assignment.title, &assignment.description, parent_task_id)
            .await?;
        let task = self.tasks().assign_task(task.task_id, specialist_id).await?;

        self.messages()
            .send_message(
                Message::new(
                    director_id,
                    specialist_id,
                    format!("Task assigned: {}\n\n{}", assignment.title, assignment.description),
                    MessageType::Task,
                )
                .with_thread(task.task_id),
            )
            .await?;

        info!(
            task_id = %short_id(&task.task_id),
            agent_id = %short_id(&specialist_id),
            title = %task.title,
            "Assigned task"
        );
        Ok(task)
    }

    /// Wait until every task assigned to `specialist_ids` is terminal, or
    /// until `timeout` passes. Either way the current snapshot is returned,
    /// newest first. Work is never cancelled.
    pub async fn wait_for_specialists(
        &self,
        specialist_ids: &[AgentId],
        timeout: Duration,
    ) -> SquadResult<Vec<Task>> {
        let deadline = Instant::now() + timeout;
        loop {
            let changed = self.tasks().changed();
            let tasks = self.tasks().get_tasks_for_agents(specialist_ids).await?;
            if !tasks.is_empty() && tasks.iter().all(|t| t.status.is_terminal()) {
                return Ok(tasks);
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    pending = tasks.iter().filter(|t| !t.status.is_terminal()).count(),
                    "Timed out waiting for specialists"
                );
                return Ok(tasks);
            }
            debug!(tasks = tasks.len(), "Waiting for specialists");
            let _ = tokio::time::timeout((deadline - now).min(self.config().poll_interval), changed).await;
        }
    }

    // ========================================================================
    // EXECUTION
    // ========================================================================

    /// Answer `task` directly, without specialists.
    pub async fn run_director(&self, ctx: &AgentContext, task: &str) -> SquadResult<String> {
        let agent_id = ctx.agent_id();
        self.registry()
            .update_agent_status(agent_id, AgentStatus::Working, None)
            .await?;

        let mut packet_input = ContextPacketInput::new(agent_id, task);
        if ctx.resume_context.is_some() {
            packet_input = packet_input.with_checkpoint();
        }
        let packet = self.build_context_packet(packet_input).await?;
        info!(agent_id = %short_id(&agent_id), "Director starting task");

        let config = RunConfig::new(agent_id, AgentRole::Director, task)
            .with_resume_context(packet.resume_context);
        let result = match self.runner().run(&config, None).await {
            Ok(result) => result,
            Err(e) => {
                self.mark_agent_error(agent_id).await;
                return Err(e);
            }
        };

        self.checkpoints()
            .create_checkpoint(
                agent_id,
                CheckpointSummary::new(task)
                    .with_completed(["Task analysis", "Initial response generated"]),
                ResumePointer::new("Review results", "complete"),
                result.usage.total(),
            )
            .await?;
        self.registry()
            .update_agent_status(agent_id, AgentStatus::Completed, None)
            .await?;
        info!(agent_id = %short_id(&agent_id), "Director completed task");
        Ok(result.content)
    }

    /// Ask the runner to split `task` into subtasks. An unusable reply
    /// degrades to one subtask carrying the whole goal.
    pub async fn decompose_task(&self, ctx: &AgentContext, task: &str) -> SquadResult<Vec<TaskAssignment>> {
        let config = RunConfig::new(ctx.agent_id(), AgentRole::Director, decompose_prompt(task));
        let result = self.runner().run(&config, None).await?;
        Ok(parse_subtasks(&result.content).unwrap_or_else(|| {
            error!(agent_id = %short_id(&ctx.agent_id()), "Failed to parse subtasks");
            vec![TaskAssignment::new("Complete task", task)]
        }))
    }

    /// Decompose, spawn and assign, run the specialists, wait, aggregate.
    pub async fn orchestrate(&self, ctx: &AgentContext, task: &str) -> SquadResult<String> {
        let agent_id = ctx.agent_id();
        info!(agent_id = %short_id(&agent_id), "Starting orchestration");
        self.registry()
            .update_agent_status(agent_id, AgentStatus::Working, None)
            .await?;

        match self.run_orchestration(ctx, task).await {
            Ok(aggregated) => {
                self.registry()
                    .update_agent_status(agent_id, AgentStatus::Completed, None)
                    .await?;
                info!(agent_id = %short_id(&agent_id), "Orchestration complete");
                Ok(aggregated)
            }
            Err(e) => {
                error!(agent_id = %short_id(&agent_id), error = %e, "Orchestration failed");
                self.mark_agent_error(agent_id).await;
                Err(e)
            }
        }
    }

    async fn run_orchestration(&self, ctx: &AgentContext, task: &str) -> SquadResult<String> {
        let agent_id = ctx.agent_id();
        let title: String = task.chars().take(ROOT_TITLE_CHARS).collect();
        let root = self.tasks().create_task(title, task, None).await?;
        self.tasks().assign_task(root.task_id, agent_id).await?;
        self.tasks()
            .update_task_status(root.task_id, TaskStatus::InProgress, None)
            .await?;
        self.registry()
            .update_agent_status(agent_id, AgentStatus::Working, Some(root.task_id))
            .await?;

        match self.delegate(ctx, task, root.task_id).await {
            Ok(aggregated) => Ok(aggregated),
            Err(e) => {
                if let Err(fail_err) = self.tasks().fail_task(root.task_id, &e).await {
                    warn!(task_id = %short_id(&root.task_id), error = %fail_err, "Failed to mark root task failed");
                }
                Err(e)
            }
        }
    }

    async fn delegate(&self, ctx: &AgentContext, task: &str, root_task_id: TaskId) -> SquadResult<String> {
        let agent_id = ctx.agent_id();
        let subtasks = self.decompose_task(ctx, task).await?;
        info!(count = subtasks.len(), "Decomposed into subtasks");

        let mut specialist_ids = Vec::with_capacity(subtasks.len());
        for subtask in &subtasks {
            let specialist = self
                .spawn_specialist(agent_id, determine_specialization(&subtask.title))
                .await?;
            self.assign_task_to_specialist(
                agent_id,
                specialist.agent_id(),
                subtask,
                Some(root_task_id),
            )
            .await?;
            specialist_ids.push(specialist.agent_id());

            let squad = self.clone();
            tokio::spawn(async move {
                if let Err(e) = squad.run_specialist(&specialist).await {
                    warn!(agent_id = %short_id(&specialist.agent_id()), error = %e, "Specialist run failed");
                }
            });
        }

        self.registry()
            .update_agent_status(agent_id, AgentStatus::Waiting, Some(root_task_id))
            .await?;
        let results = self
            .wait_for_specialists(&specialist_ids, self.config().wait_timeout)
            .await?;
        let aggregated = aggregate_results(&results);

        if aggregated.is_empty() {
            self.tasks()
                .fail_task(root_task_id, "No specialist produced a result")
                .await?;
        } else {
            self.tasks().complete_task(root_task_id, &aggregated).await?;
        }

        self.checkpoints()
            .create_checkpoint(
                agent_id,
                CheckpointSummary::new(task)
                    .with_completed(subtasks.iter().map(|s| s.title.clone()))
                    .with_decisions([format!("Spawned {} specialists", specialist_ids.len())]),
                ResumePointer::new("Report final results", "aggregation"),
                0,
            )
            .await?;
        Ok(aggregated)
    }

    /// Best-effort flip to `error`; the original failure is what callers see.
    pub(crate) async fn mark_agent_error(&self, agent_id: AgentId) {
        if let Err(e) = self
            .registry()
            .update_agent_status(agent_id, AgentStatus::Error, None)
            .await
        {
            warn!(agent_id = %short_id(&agent_id), error = %e, "Failed to record agent error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn task_with(title: &str, status: TaskStatus, result: Option<&str>) -> Task {
        let mut task = Task::new(title, "d");
        task.status = status;
        task.result = result.map(str::to_string);
        task
    }

    #[test]
    fn test_aggregate_results() {
        let tasks = vec![
            task_with("A", TaskStatus::Completed, Some("X")),
            task_with("B", TaskStatus::Failed, Some("Error: boom")),
            task_with("C", TaskStatus::Completed, Some("Y")),
            task_with("D", TaskStatus::InProgress, None),
        ];
        assert_eq!(aggregate_results(&tasks), "## A\n\nX\n\n---\n\n## C\n\nY");
        assert_eq!(aggregate_results(&tasks[1..2]), "");
        assert_eq!(aggregate_results(&[]), "");
    }

    #[test]
    fn test_determine_specialization() {
        assert_eq!(determine_specialization("Research the market"), Specialization::Researcher);
        assert_eq!(determine_specialization("Draft the summary"), Specialization::Writer);
        assert_eq!(determine_specialization("Evaluate options"), Specialization::Analyst);
        assert_eq!(determine_specialization("Plan the launch"), Specialization::General);
        // Research vocabulary wins over writing vocabulary.
        assert_eq!(
            determine_specialization("Find and document sources"),
            Specialization::Researcher
        );
    }

    #[test]
    fn test_parse_subtasks() {
        let bare = r#"[{"title":"A","description":"a"},{"title":"B","description":"b"}]"#;
        assert_eq!(parse_subtasks(bare).unwrap().len(), 2);

        let fenced = format!("```json\n{}\n```", bare);
        assert_eq!(parse_subtasks(&fenced).unwrap()[1].title, "B");

        assert_eq!(parse_subtasks("not json"), None);
        assert_eq!(parse_subtasks("[]"), None);
        assert_eq!(parse_subtasks(r#"[{"title":" ","description":"x"}]"#), None);
        assert_eq!(parse_subtasks(r#"{"title":"A","description":"a"}"#), None);
    }

    #[test]
    fn test_decompose_prompt_embeds_task() {
        let prompt = decompose_prompt("Ship it");
        assert!(prompt.starts_with("Analyze this task and break it down into 2-3 subtasks"));
        assert!(prompt.contains("Task: Ship it\n"));
        assert!(prompt.contains(r#"{"title": "Subtask 1 Title", "description": "Detailed description..."}"#));
        assert!(prompt.ends_with("Only output the JSON array, nothing else."));
    }

    #[test]
    fn test_assignment_serde_shape() {
        let value = serde_json::to_value(TaskAssignment::new("T", "D")).unwrap();
        assert_eq!(value, serde_json::json!({"title": "T", "description": "D"}));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_aggregate_excludes_failed(results in proptest::collection::vec(("[a-z]{1,8}", any::<bool>()), 0..8)) {
            let tasks: Vec<Task> = results
                .iter()
                .map(|(r, ok)| {
                    if *ok {
                        task_with("T", TaskStatus::Completed, Some(r))
                    } else {
                        task_with("T", TaskStatus::Failed, Some("Error: nope"))
                    }
                })
                .collect();
            let out = aggregate_results(&tasks);
            prop_assert!(!out.contains("Error: nope"));
            let completed = results.iter().filter(|(_, ok)| *ok).count();
            prop_assert_eq!(out.matches("## T").count(), completed);
        }
    }
}
