//! Specialist role
//!
//! Executes assigned tasks end to end: pick up, checkpoint, run, report,
//! checkpoint again. Any failure after pick-up marks the task failed and
//! the agent errored before the error is returned.

use crate::registry::{AgentConfig, AgentContext};
use crate::squad::Squad;
use squad_core::{
    short_id, AgentError, AgentId, AgentRole, AgentStatus, CheckpointSummary, Message,
    MessageType, ResumePointer, Specialization, SquadResult, Task, TaskId, TaskStatus,
};
use squad_llm::{RunConfig, RunResult};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Characters of streamed output echoed to the debug log.
const OUTPUT_PREVIEW_CHARS: usize = 100;

/// Specialization-flavoured prompt for a task.
pub fn build_task_prompt(task: &Task, specialization: Specialization) -> String {
    let guidance = match specialization {
        Specialization::Researcher => {
            "As a Research Specialist, focus on:
- Finding accurate and relevant information
- Citing sources where applicable
- Providing comprehensive coverage of the topic"
        }
        Specialization::Writer => {
            "As a Writing Specialist, focus on:
- Clear and engaging prose
- Logical structure and flow
- Appropriate tone for the context"
        }
        Specialization::Analyst => {
            "As an Analysis Specialist, focus on:
- Data-driven insights
- Identifying patterns and trends
- Providing actionable recommendations"
        }
        Specialization::General => "Complete this task to the best of your ability.",
    };
    format!(
        "{}\n\n## Task: {}\n\n{}\n\nPlease complete this task thoroughly and provide a detailed response.",
        guidance, task.title, task.description
    )
}

fn parent_of(ctx: &AgentContext) -> SquadResult<AgentId> {
    ctx.agent.parent_id.ok_or_else(|| AgentError::MissingParent.into())
}

impl Squad {
    pub async fn create_specialist(
        &self,
        parent_id: AgentId,
        specialization: Specialization,
    ) -> SquadResult<AgentContext> {
        let ctx = self
            .initialize_agent(AgentConfig::specialist(parent_id, specialization))
            .await?;
        info!(
            agent_id = %short_id(&ctx.agent_id()),
            specialization = %specialization,
            "Specialist created"
        );
        Ok(ctx)
    }

    /// Unread messages, polling limit.
    pub async fn check_inbox(&self, agent_id: AgentId) -> SquadResult<Vec<Message>> {
        self.messages().check_inbox(agent_id).await
    }

    /// Complete the task and send the result to the director, threaded on
    /// the task id.
    pub async fn report_result(
        &self,
        specialist_id: AgentId,
        director_id: AgentId,
        task_id: TaskId,
        result: &str,
    ) -> SquadResult<()> {
        self.tasks().complete_task(task_id, result).await?;
        self.messages()
            .send_message(
                Message::new(specialist_id, director_id, result, MessageType::Result)
                    .with_thread(task_id),
            )
            .await?;
        info!(
            agent_id = %short_id(&specialist_id),
            director_id = %short_id(&director_id),
            "Reported result"
        );
        Ok(())
    }

    /// Run the completion for one task.
    pub async fn process_task(&self, ctx: &AgentContext, task: &Task) -> SquadResult<RunResult> {
        let specialization = ctx.agent.specialization.unwrap_or_default();
        let config = RunConfig::new(
            ctx.agent_id(),
            AgentRole::Specialist,
            build_task_prompt(task, specialization),
        )
        .with_specialization(specialization)
        .with_resume_context(ctx.resume_context.clone());

        info!(agent_id = %short_id(&ctx.agent_id()), title = %task.title, "Processing task");
        let on_message = |content: &str| {
            let preview: String = content.chars().take(OUTPUT_PREVIEW_CHARS).collect();
            debug!(output = %preview, "Specialist output");
        };
        self.runner().run(&config, Some(&on_message)).await
    }

    /// Execute one task end to end and return the result text.
    pub async fn execute_task(
        &self,
        ctx: &AgentContext,
        task: &Task,
        director_id: AgentId,
    ) -> SquadResult<String> {
        let agent_id = ctx.agent_id();
        self.registry()
            .update_agent_status(agent_id, AgentStatus::Working, Some(task.task_id))
            .await?;

        match self.run_task(ctx, task, director_id).await {
            Ok(content) => {
                self.registry()
                    .update_agent_status(agent_id, AgentStatus::Completed, None)
                    .await?;
                Ok(content)
            }
            Err(e) => {
                error!(
                    agent_id = %short_id(&agent_id),
                    task_id = %short_id(&task.task_id),
                    error = %e,
                    "Task failed"
                );
                if let Err(fail_err) = self.tasks().fail_task(task.task_id, &e).await {
                    warn!(task_id = %short_id(&task.task_id), error = %fail_err, "Failed to mark task failed");
                }
                self.mark_agent_error(agent_id).await;
                Err(e)
            }
        }
    }

    async fn run_task(&self, ctx: &AgentContext, task: &Task, director_id: AgentId) -> SquadResult<String> {
        let agent_id = ctx.agent_id();
        self.tasks()
            .update_task_status(task.task_id, TaskStatus::InProgress, None)
            .await?;
        self.checkpoints()
            .create_checkpoint(
                agent_id,
                CheckpointSummary::new(&task.title).with_pending([task.title.clone()]),
                ResumePointer::new(format!("Complete task: {}", task.title), "executing"),
                0,
            )
            .await?;

        let result = self.process_task(ctx, task).await?;
        self.report_result(agent_id, director_id, task.task_id, &result.content)
            .await?;

        self.checkpoints()
            .create_checkpoint(
                agent_id,
                CheckpointSummary::new(&task.title).with_completed([task.title.clone()]),
                ResumePointer::new("Task completed", "complete"),
                result.usage.total(),
            )
            .await?;
        Ok(result.content)
    }

    /// Execute every task currently assigned to the specialist. Failures are
    /// logged and do not stop the loop. Returns how many succeeded.
    pub async fn run_specialist(&self, ctx: &AgentContext) -> SquadResult<usize> {
        let director_id = parent_of(ctx)?;
        let tasks = self
            .tasks()
            .get_agent_tasks(ctx.agent_id(), Some(TaskStatus::Assigned))
            .await?;
        if tasks.is_empty() {
            info!(agent_id = %short_id(&ctx.agent_id()), "No tasks assigned");
            return Ok(0);
        }

        let mut completed = 0;
        for task in &tasks {
            match self.execute_task(ctx, task, director_id).await {
                Ok(_) => completed += 1,
                Err(e) => {
                    warn!(task_id = %short_id(&task.task_id), error = %e, "Specialist task failed")
                }
            }
        }
        info!(agent_id = %short_id(&ctx.agent_id()), completed, "Work loop complete");
        Ok(completed)
    }

    /// Serve incoming `task` messages until `timeout` passes. Each batch of
    /// task messages is marked read before the assigned tasks run. Returns
    /// how many tasks were executed.
    pub async fn await_tasks(&self, ctx: &AgentContext, timeout: Duration) -> SquadResult<usize> {
        let director_id = parent_of(ctx)?;
        let agent_id = ctx.agent_id();
        let deadline = Instant::now() + timeout;
        let mut executed = 0;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(executed);
            }
            let inbox = self
                .messages()
                .wait_for_message(agent_id, deadline - now)
                .await?;
            let task_messages: Vec<_> = inbox
                .iter()
                .filter(|m| m.message_type == MessageType::Task)
                .map(|m| m.message_id)
                .collect();

            if task_messages.is_empty() {
                // Only other mail is waiting; back off instead of spinning.
                let now = Instant::now();
                if now < deadline {
                    tokio::time::sleep((deadline - now).min(self.config().poll_interval)).await;
                }
                continue;
            }

            self.messages().mark_messages_as_read(&task_messages).await?;
            let tasks = self
                .tasks()
                .get_agent_tasks(agent_id, Some(TaskStatus::Assigned))
                .await?;
            for task in &tasks {
                self.execute_task(ctx, task, director_id).await?;
                executed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_prompt_per_specialization() {
        let task = Task::new("Survey", "Collect three sources");
        let researcher = build_task_prompt(&task, Specialization::Researcher);
        assert!(researcher.starts_with("As a Research Specialist, focus on:\n- Finding accurate"));
        assert!(researcher.ends_with(
            "## Task: Survey\n\nCollect three sources\n\nPlease complete this task thoroughly and provide a detailed response."
        ));

        let general = build_task_prompt(&task, Specialization::General);
        assert!(general.starts_with("Complete this task to the best of your ability.\n\n## Task: Survey"));

        assert!(build_task_prompt(&task, Specialization::Writer).contains("- Clear and engaging prose"));
        assert!(build_task_prompt(&task, Specialization::Analyst)
            .contains("- Providing actionable recommendations"));
    }
}
