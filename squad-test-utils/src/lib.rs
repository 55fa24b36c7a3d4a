//! Squad Test Utilities
//!
//! Shared test infrastructure for the squad workspace:
//! - An in-memory harness wiring a full squad to mock providers
//! - Proptest generators for entity types
//! - Fixtures for common scenarios
//! - Assertions over `SquadResult`

pub use squad_core::{
    AgentId, AgentRole, AgentStatus, CheckpointSummary, CoordinationConfig, Message,
    MessagePriority, MessageType, ResumePointer, SandboxDefaults, Specialization, SquadError,
    SquadResult, Task, TaskId, TaskStatus, Timestamp,
};

use squad_agents::Squad;
use squad_events::EventBus;
use squad_llm::MockRunner;
use squad_sandbox::{MockSandboxProvider, SandboxManager};
use squad_storage::{Collections, InMemoryStore};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// HARNESS
// ============================================================================

/// A squad over an in-memory store, a mock sandbox provider and a scripted
/// runner. Every handle shares state with the squad it came from.
pub struct TestSquad {
    pub squad: Squad,
    pub store: Arc<InMemoryStore>,
    pub runner: MockRunner,
    pub provider: MockSandboxProvider,
    pub sandboxes: Arc<SandboxManager>,
    pub events: EventBus,
}

impl TestSquad {
    /// Fast timings, no sandbox provisioning.
    pub fn new() -> SquadResult<Self> {
        Self::with_config(fixtures::fast_config())
    }

    /// Fast timings with a sandbox for every spawned agent.
    pub fn provisioned() -> SquadResult<Self> {
        Self::with_config(CoordinationConfig {
            provision_sandboxes: true,
            ..fixtures::fast_config()
        })
    }

    /// Fast timings and a pre-scripted runner.
    pub fn with_runner(runner: MockRunner) -> SquadResult<Self> {
        Self::build(fixtures::fast_config(), runner)
    }

    pub fn with_config(config: CoordinationConfig) -> SquadResult<Self> {
        Self::build(config, MockRunner::new())
    }

    pub fn build(config: CoordinationConfig, runner: MockRunner) -> SquadResult<Self> {
        let store = Arc::new(InMemoryStore::new());
        let events = EventBus::default();
        let provider = MockSandboxProvider::new();
        let tracking = Collections::new(store.clone()).sandbox_tracking;
        let sandboxes = Arc::new(SandboxManager::new(
            Arc::new(provider.clone()),
            tracking,
            events.clone(),
        ));
        let squad = Squad::builder(store.clone(), Arc::new(runner.clone()))
            .with_events(events.clone())
            .with_sandboxes(sandboxes.clone())
            .with_config(config)
            .build()?;
        Ok(Self {
            squad,
            store,
            runner,
            provider,
            sandboxes,
            events,
        })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for squad entity types.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    pub fn arb_entity_id() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_specialization() -> impl Strategy<Value = Specialization> {
        proptest::sample::select(Specialization::ALL.to_vec())
    }

    pub fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Pending),
            Just(TaskStatus::Assigned),
            Just(TaskStatus::InProgress),
            Just(TaskStatus::Completed),
            Just(TaskStatus::Failed),
        ]
    }

    pub fn arb_agent_status() -> impl Strategy<Value = AgentStatus> {
        prop_oneof![
            Just(AgentStatus::Idle),
            Just(AgentStatus::Working),
            Just(AgentStatus::Waiting),
            Just(AgentStatus::Completed),
            Just(AgentStatus::Error),
        ]
    }

    pub fn arb_message_type() -> impl Strategy<Value = MessageType> {
        prop_oneof![
            Just(MessageType::Task),
            Just(MessageType::Result),
            Just(MessageType::Status),
            Just(MessageType::Error),
        ]
    }

    pub fn arb_priority() -> impl Strategy<Value = MessagePriority> {
        prop_oneof![
            Just(MessagePriority::High),
            Just(MessagePriority::Normal),
            Just(MessagePriority::Low),
        ]
    }

    /// Non-blank single-line text.
    pub fn arb_text() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9 ]{0,40}"
    }

    pub fn arb_message(from: AgentId, to: AgentId) -> impl Strategy<Value = Message> {
        (arb_text(), arb_message_type(), arb_priority()).prop_map(
            move |(content, message_type, priority)| {
                Message::new(from, to, content, message_type).with_priority(priority)
            },
        )
    }

    pub fn arb_checkpoint_summary() -> impl Strategy<Value = CheckpointSummary> {
        (
            arb_text(),
            proptest::collection::vec(arb_text(), 0..4),
            proptest::collection::vec(arb_text(), 0..4),
            proptest::collection::vec(arb_text(), 0..4),
        )
            .prop_map(|(goal, completed, pending, decisions)| {
                CheckpointSummary::new(goal)
                    .with_completed(completed)
                    .with_pending(pending)
                    .with_decisions(decisions)
            })
    }

    pub fn arb_resume_pointer() -> impl Strategy<Value = ResumePointer> {
        (arb_text(), arb_text(), proptest::option::of(arb_text())).prop_map(
            |(next_action, phase, context)| {
                let pointer = ResumePointer::new(next_action, phase);
                match context {
                    Some(context) => pointer.with_context(context),
                    None => pointer,
                }
            },
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;

    /// Coordination timings short enough for tests.
    pub fn fast_config() -> CoordinationConfig {
        CoordinationConfig {
            poll_interval: Duration::from_millis(10),
            wait_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    /// A decomposition reply in the shape the director asks for.
    pub fn subtasks_json(subtasks: &[(&str, &str)]) -> String {
        let items: Vec<serde_json::Value> = subtasks
            .iter()
            .map(|(title, description)| {
                serde_json::json!({"title": title, "description": description})
            })
            .collect();
        serde_json::Value::Array(items).to_string()
    }

    /// A task already in `status`, with a result when terminal.
    pub fn task_in(title: &str, status: TaskStatus) -> Task {
        let mut task = Task::new(title, format!("{} details", title));
        task.status = status;
        if status.is_terminal() {
            task.result = Some(format!("{} result", title));
        }
        task
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over squad results.

    use super::*;
    use squad_core::{AgentError, LlmError, SandboxError, ValidationError};

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &SquadResult<T>) {
        match result {
            Err(e) if e.is_not_found() => {}
            other => panic!("Expected a not-found error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_timeout<T: std::fmt::Debug>(result: &SquadResult<T>) {
        match result {
            Err(e) if e.is_timeout() => {}
            other => panic!("Expected a timeout, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &SquadResult<T>) {
        match result {
            Err(SquadError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_invalid_transition<T: std::fmt::Debug>(
        result: &SquadResult<T>,
        from: TaskStatus,
        to: TaskStatus,
    ) {
        match result {
            Err(SquadError::Validation(ValidationError::InvalidTransition {
                from: f, to: t, ..
            })) => {
                assert_eq!((*f, *t), (from, to), "Wrong transition in error");
            }
            other => panic!("Expected InvalidTransition {} -> {}, got: {:?}", from, to, other),
        }
    }

    #[track_caller]
    pub fn assert_command_failed<T: std::fmt::Debug>(result: &SquadResult<T>, exit_code: i32) {
        match result {
            Err(SquadError::Sandbox(SandboxError::CommandFailed { exit_code: code, .. })) => {
                assert_eq!(*code, exit_code, "Wrong exit code in CommandFailed");
            }
            other => panic!("Expected CommandFailed, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_agent_error<T: std::fmt::Debug>(result: &SquadResult<T>) {
        match result {
            Err(SquadError::Agent(_)) => {}
            other => panic!("Expected Agent error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_missing_parent<T: std::fmt::Debug>(result: &SquadResult<T>) {
        match result {
            Err(SquadError::Agent(AgentError::MissingParent)) => {}
            other => panic!("Expected MissingParent, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_rate_limited<T: std::fmt::Debug>(result: &SquadResult<T>) {
        match result {
            Err(SquadError::Llm(LlmError::RateLimited { .. })) => {}
            other => panic!("Expected RateLimited, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_task_status(task: &Task, expected: TaskStatus) {
        assert_eq!(
            task.status, expected,
            "Task {} has status {}, expected {}",
            task.title, task.status, expected
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
