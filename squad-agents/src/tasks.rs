//! Task coordination engine
//!
//! `pending -> assigned -> in_progress -> completed | failed`. Every write
//! is a compare-and-swap on `(task_id, version)`, and illegal transitions
//! are rejected before touching the store.

use chrono::Utc;
use squad_core::{
    short_id, AgentError, AgentId, SquadResult, StorageError, Task, TaskId, TaskStatus,
    ValidationError,
};
use squad_events::{EventBus, SquadEvent};
use squad_storage::{Collection, Filter, FindOptions, SortKey, Update};
use std::sync::Arc;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::info;

/// Handle onto the `tasks` collection.
#[derive(Clone)]
pub struct TaskBoard {
    tasks: Collection<Task>,
    events: EventBus,
    changes: Arc<Notify>,
}

impl TaskBoard {
    pub fn new(tasks: Collection<Task>, events: EventBus) -> Self {
        Self {
            tasks,
            events,
            changes: Arc::new(Notify::new()),
        }
    }

    /// Resolves on the next task write. Create it before reading state so
    /// no write is missed.
    pub fn changed(&self) -> Notified<'_> {
        self.changes.notified()
    }

    // ========================================================================
    // CREATE / READ
    // ========================================================================

    /// Create a pending, unassigned task.
    pub async fn create_task(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        parent_task_id: Option<TaskId>,
    ) -> SquadResult<Task> {
        let mut task = Task::new(title, description);
        task.parent_task_id = parent_task_id;
        self.tasks.insert(&task).await?;

        info!(task_id = %short_id(&task.task_id), title = %task.title, "Task created");
        self.events.publish(SquadEvent::TaskCreated {
            task_id: task.task_id,
            title: task.title.clone(),
            parent_task_id: task.parent_task_id,
            assigned_to: None,
            timestamp: task.created_at,
        });
        Ok(task)
    }

    pub async fn get_task(&self, task_id: TaskId) -> SquadResult<Option<Task>> {
        self.tasks.get(task_id).await
    }

    pub async fn require_task(&self, task_id: TaskId) -> SquadResult<Task> {
        self.get_task(task_id)
            .await?
            .ok_or_else(|| AgentError::TaskNotFound { task_id }.into())
    }

    /// Tasks assigned to `agent_id`, newest first.
    pub async fn get_agent_tasks(
        &self,
        agent_id: AgentId,
        status: Option<TaskStatus>,
    ) -> SquadResult<Vec<Task>> {
        let mut filter = Filter::new().eq("assigned_to", agent_id);
        if let Some(status) = status {
            filter = filter.eq("status", status);
        }
        self.tasks
            .find_many(&filter, &FindOptions::new().sort(SortKey::desc("created_at")))
            .await
    }

    /// Tasks assigned to any of `agent_ids`, newest first.
    pub async fn get_tasks_for_agents(&self, agent_ids: &[AgentId]) -> SquadResult<Vec<Task>> {
        if agent_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.tasks
            .find_many(
                &Filter::new().is_in("assigned_to", agent_ids.iter().copied()),
                &FindOptions::new().sort(SortKey::desc("created_at")),
            )
            .await
    }

    /// Children of `parent_task_id`, oldest first.
    pub async fn get_subtasks(&self, parent_task_id: TaskId) -> SquadResult<Vec<Task>> {
        self.tasks
            .find_many(
                &Filter::new().eq("parent_task_id", parent_task_id),
                &FindOptions::new().sort(SortKey::asc("created_at")),
            )
            .await
    }

    /// Every task, newest first.
    pub async fn list_tasks(&self) -> SquadResult<Vec<Task>> {
        self.tasks
            .find_many(&Filter::new(), &FindOptions::new().sort(SortKey::desc("created_at")))
            .await
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    pub async fn assign_task(&self, task_id: TaskId, agent_id: AgentId) -> SquadResult<Task> {
        self.transition(task_id, TaskStatus::Assigned, Some(agent_id), None)
            .await
    }

    /// Move a task to `status`, optionally recording a result.
    pub async fn update_task_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        result: Option<String>,
    ) -> SquadResult<Task> {
        self.transition(task_id, status, None, result).await
    }

    pub async fn complete_task(&self, task_id: TaskId, result: impl Into<String>) -> SquadResult<Task> {
        self.transition(task_id, TaskStatus::Completed, None, Some(result.into()))
            .await
    }

    pub async fn fail_task(&self, task_id: TaskId, error: impl std::fmt::Display) -> SquadResult<Task> {
        self.transition(
            task_id,
            TaskStatus::Failed,
            None,
            Some(format!("Error: {}", error)),
        )
        .await
    }

    async fn transition(
        &self,
        task_id: TaskId,
        to: TaskStatus,
        assigned_to: Option<AgentId>,
        result: Option<String>,
    ) -> SquadResult<Task> {
        let current = self.require_task(task_id).await?;
        if !current.status.can_transition_to(to) {
            return Err(ValidationError::InvalidTransition {
                task_id,
                from: current.status,
                to,
            }
            .into());
        }

        let now = Utc::now();
        let mut next = current.clone();
        next.status = to;
        next.updated_at = now;
        next.version = current.version + 1;
        let mut update = Update::new()
            .set("status", to)
            .set("updated_at", now)
            .set("version", next.version);
        if let Some(agent_id) = assigned_to {
            next.assigned_to = Some(agent_id);
            update = update.set("assigned_to", agent_id);
        }
        if let Some(result) = result {
            update = update.set("result", &result);
            next.result = Some(result);
        }
        next.validate()?;

        let outcome = self
            .tasks
            .update_one(
                &Filter::new()
                    .eq("task_id", task_id)
                    .eq("version", current.version),
                &update,
            )
            .await?;
        if outcome.matched == 0 {
            return Err(StorageError::ConcurrentModification {
                collection: "tasks".to_string(),
                key: task_id.to_string(),
            }
            .into());
        }

        info!(
            task_id = %short_id(&task_id),
            from = %current.status,
            to = %to,
            "Task status changed"
        );
        self.events
            .publish(SquadEvent::task_status(task_id, to, next.assigned_to));
        self.changes.notify_waiters();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use squad_core::{new_entity_id, SquadError};
    use squad_storage::{Collections, InMemoryStore};

    fn board() -> TaskBoard {
        let collections = Collections::new(Arc::new(InMemoryStore::new()));
        TaskBoard::new(collections.tasks, EventBus::default())
    }

    #[tokio::test]
    async fn test_create_then_get_round_trips() {
        let board = board();
        let created = board.create_task("Research X", "Find sources", None).await.unwrap();
        let fetched = board.get_task(created.task_id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.status, TaskStatus::Pending);
        assert_eq!(fetched.assigned_to, None);
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let board = board();
        let agent = new_entity_id();
        let task = board.create_task("t", "d", None).await.unwrap();

        let assigned = board.assign_task(task.task_id, agent).await.unwrap();
        assert_eq!(assigned.status, TaskStatus::Assigned);
        assert_eq!(assigned.assigned_to, Some(agent));

        board
            .update_task_status(task.task_id, TaskStatus::InProgress, None)
            .await
            .unwrap();
        let done = board.complete_task(task.task_id, "X").await.unwrap();
        assert_eq!(done.result.as_deref(), Some("X"));
        assert_eq!(done.version, 3);

        let stored = board.require_task(task.task_id).await.unwrap();
        assert_eq!(stored, done);
    }

    #[tokio::test]
    async fn test_fail_prefixes_error() {
        let board = board();
        let task = board.create_task("t", "d", None).await.unwrap();
        let failed = board.fail_task(task.task_id, "rate limited").await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.result.as_deref(), Some("Error: rate limited"));
    }

    #[tokio::test]
    async fn test_terminal_tasks_are_frozen() {
        let board = board();
        let task = board.create_task("t", "d", None).await.unwrap();
        board.complete_task(task.task_id, "done").await.unwrap();
        let err = board
            .update_task_status(task.task_id, TaskStatus::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SquadError::Validation(ValidationError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_result_requires_terminal_status() {
        let board = board();
        let task = board.create_task("t", "d", None).await.unwrap();
        let err = board
            .update_task_status(task.task_id, TaskStatus::InProgress, Some("early".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, SquadError::Validation(_)));
        assert_eq!(
            board.require_task(task.task_id).await.unwrap().status,
            TaskStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_transition_uses_current_version() {
        let board = board();
        let task = board.create_task("t", "d", None).await.unwrap();
        board
            .tasks
            .update_one(
                &Filter::new().eq("task_id", task.task_id),
                &Update::new().set("version", 7u64),
            )
            .await
            .unwrap();

        assert!(board.assign_task(task.task_id, new_entity_id()).await.is_ok());
        assert_eq!(board.require_task(task.task_id).await.unwrap().version, 8);
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let board = board();
        let err = board
            .assign_task(new_entity_id(), new_entity_id())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_queries_ordering() {
        let board = board();
        let agent = new_entity_id();
        let parent = board.create_task("parent", "p", None).await.unwrap();
        let a = board.create_task("a", "d", Some(parent.task_id)).await.unwrap();
        let b = board.create_task("b", "d", Some(parent.task_id)).await.unwrap();
        board.assign_task(a.task_id, agent).await.unwrap();
        board.assign_task(b.task_id, agent).await.unwrap();
        board
            .update_task_status(b.task_id, TaskStatus::InProgress, None)
            .await
            .unwrap();

        let subtasks: Vec<_> = board
            .get_subtasks(parent.task_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(subtasks, vec!["a", "b"]);

        let mine: Vec<_> = board
            .get_agent_tasks(agent, None)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(mine, vec!["b", "a"]);

        let assigned = board
            .get_agent_tasks(agent, Some(TaskStatus::Assigned))
            .await
            .unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].title, "a");

        assert_eq!(board.list_tasks().await.unwrap()[0].title, "b");
        assert!(board.get_tasks_for_agents(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_wakes_waiters() {
        let board = board();
        let task = board.create_task("t", "d", None).await.unwrap();
        let changed = board.changed();
        board.assign_task(task.task_id, new_entity_id()).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), changed)
            .await
            .unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_terminal_status_never_moves(to in proptest::sample::select(vec![
            TaskStatus::Pending,
            TaskStatus::Assigned,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ])) {
            prop_assert!(!TaskStatus::Completed.can_transition_to(to));
            prop_assert!(!TaskStatus::Failed.can_transition_to(to));
        }
    }
}
