//! End-to-end director/specialist flows over the in-memory harness.

use squad_agents::{AgentConfig, TaskAssignment};
use squad_core::{
    AgentStatus, LlmError, MessageType, Specialization, SquadError, TaskStatus,
};
use squad_llm::MockRunner;
use squad_test_utils::{assertions, fixtures, TestSquad};
use std::time::Duration;

fn scripted_runner() -> MockRunner {
    MockRunner::new().with_responder(|config| {
        if config.task.contains("break it down into 2-3 subtasks") {
            fixtures::subtasks_json(&[
                ("Research the topic", "Find three sources"),
                ("Write the summary", "Draft two paragraphs"),
            ])
        } else {
            format!("{} output", config.specialization.unwrap_or_default())
        }
    })
}

#[tokio::test]
async fn test_orchestrate_end_to_end() {
    let harness = TestSquad::with_runner(scripted_runner()).unwrap();
    let squad = &harness.squad;
    let mut events = harness.events.subscribe();

    let director = squad.create_director().await.unwrap();
    let aggregated = squad
        .orchestrate(&director, "Produce a briefing on tidal energy")
        .await
        .unwrap();

    assert!(aggregated.contains("## Research the topic\n\nresearcher output"));
    assert!(aggregated.contains("## Write the summary\n\nwriter output"));
    assert!(aggregated.contains("\n\n---\n\n"));

    // Root task carries the aggregate, subtasks hang off it in order.
    let director_tasks = squad
        .tasks()
        .get_agent_tasks(director.agent_id(), None)
        .await
        .unwrap();
    assert_eq!(director_tasks.len(), 1);
    let root = &director_tasks[0];
    assertions::assert_task_status(root, TaskStatus::Completed);
    assert_eq!(root.result.as_deref(), Some(aggregated.as_str()));
    assert_eq!(root.title, "Produce a briefing on tidal energy");

    let subtasks = squad.tasks().get_subtasks(root.task_id).await.unwrap();
    let titles: Vec<_> = subtasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Research the topic", "Write the summary"]);
    assert!(subtasks.iter().all(|t| t.status == TaskStatus::Completed));

    let specialists = squad
        .registry()
        .get_specialists(director.agent_id())
        .await
        .unwrap();
    let specializations: Vec<_> = specialists.iter().map(|s| s.specialization).collect();
    assert_eq!(
        specializations,
        vec![Some(Specialization::Researcher), Some(Specialization::Writer)]
    );
    assert!(specialists.iter().all(|s| s.status == AgentStatus::Completed));

    let director_record = squad
        .registry()
        .require_agent(director.agent_id())
        .await
        .unwrap();
    assert_eq!(director_record.status, AgentStatus::Completed);

    let checkpoint = squad
        .checkpoints()
        .latest(director.agent_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.resume_pointer.phase, "aggregation");
    assert_eq!(checkpoint.resume_pointer.next_action, "Report final results");
    assert_eq!(checkpoint.summary.decisions, vec!["Spawned 2 specialists"]);
    assert_eq!(
        checkpoint.summary.completed,
        vec!["Research the topic", "Write the summary"]
    );

    // Each subtask thread holds the assignment followed by the result.
    let thread = squad.messages().get_thread(subtasks[0].task_id).await.unwrap();
    let kinds: Vec<_> = thread.iter().map(|m| m.message_type).collect();
    assert_eq!(kinds, vec![MessageType::Task, MessageType::Result]);
    assert_eq!(
        thread[0].content,
        "Task assigned: Research the topic\n\nFind three sources"
    );

    assert_eq!(harness.runner.call_count(), 3);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type());
    }
    for expected in [
        "agent:created",
        "agent:status",
        "task:created",
        "task:status",
        "message:new",
        "checkpoint:new",
    ] {
        assert!(seen.contains(&expected), "missing {} in {:?}", expected, seen);
    }
}

#[tokio::test]
async fn test_unparseable_decomposition_falls_back_to_one_subtask() {
    let runner = MockRunner::new().with_fallback("I would rather chat");
    let harness = TestSquad::with_runner(runner).unwrap();
    let squad = &harness.squad;

    let director = squad.create_director().await.unwrap();
    let subtasks = squad.decompose_task(&director, "Plan a picnic").await.unwrap();
    assert_eq!(subtasks, vec![TaskAssignment::new("Complete task", "Plan a picnic")]);

    let aggregated = squad.orchestrate(&director, "Plan a picnic").await.unwrap();
    assert_eq!(aggregated, "## Complete task\n\nI would rather chat");

    let specialists = squad
        .registry()
        .get_specialists(director.agent_id())
        .await
        .unwrap();
    assert_eq!(specialists.len(), 1);
    assert_eq!(specialists[0].specialization, Some(Specialization::General));
}

#[tokio::test]
async fn test_specialist_failure_is_excluded_from_aggregate() {
    let runner = MockRunner::new();
    runner.push_response(fixtures::subtasks_json(&[("Analyze churn", "Use the Q3 data")]));
    runner.push_error(LlmError::RateLimited {
        provider: "anthropic".to_string(),
    });
    let harness = TestSquad::with_runner(runner).unwrap();
    let squad = &harness.squad;

    let director = squad.create_director().await.unwrap();
    let aggregated = squad.orchestrate(&director, "Explain churn").await.unwrap();
    assert_eq!(aggregated, "");

    let specialists = squad
        .registry()
        .get_specialists(director.agent_id())
        .await
        .unwrap();
    assert_eq!(specialists[0].status, AgentStatus::Error);

    let tasks = squad
        .tasks()
        .get_agent_tasks(specialists[0].agent_id, None)
        .await
        .unwrap();
    assertions::assert_task_status(&tasks[0], TaskStatus::Failed);
    let result = tasks[0].result.as_deref().unwrap_or_default();
    assert!(result.starts_with("Error: "));
    assert!(result.contains("Rate limited by anthropic"));

    let root = squad
        .tasks()
        .get_agent_tasks(director.agent_id(), None)
        .await
        .unwrap()
        .remove(0);
    assertions::assert_task_status(&root, TaskStatus::Failed);
    assert_eq!(
        squad
            .registry()
            .require_agent(director.agent_id())
            .await
            .unwrap()
            .status,
        AgentStatus::Completed
    );
}

#[tokio::test]
async fn test_decomposition_upstream_error_propagates() {
    let runner = MockRunner::new();
    runner.fail_with(Some(LlmError::InvalidApiKey {
        provider: "anthropic".to_string(),
    }));
    let harness = TestSquad::with_runner(runner).unwrap();
    let squad = &harness.squad;

    let director = squad.create_director().await.unwrap();
    let err = squad.orchestrate(&director, "Anything").await.unwrap_err();
    assert!(matches!(err, SquadError::Llm(LlmError::InvalidApiKey { .. })));

    let director_record = squad
        .registry()
        .require_agent(director.agent_id())
        .await
        .unwrap();
    assert_eq!(director_record.status, AgentStatus::Error);

    let root = squad
        .tasks()
        .get_agent_tasks(director.agent_id(), None)
        .await
        .unwrap()
        .remove(0);
    assertions::assert_task_status(&root, TaskStatus::Failed);
}

#[tokio::test]
async fn test_wait_returns_partial_snapshot_on_timeout() {
    let harness = TestSquad::new().unwrap();
    let squad = &harness.squad;

    let director = squad.create_director().await.unwrap();
    let specialist = squad
        .spawn_specialist(director.agent_id(), Specialization::Analyst)
        .await
        .unwrap();
    squad
        .assign_task_to_specialist(
            director.agent_id(),
            specialist.agent_id(),
            &TaskAssignment::new("Review figures", "Check totals"),
            None,
        )
        .await
        .unwrap();

    let snapshot = squad
        .wait_for_specialists(&[specialist.agent_id()], Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 1);
    assertions::assert_task_status(&snapshot[0], TaskStatus::Assigned);

    let none = squad
        .wait_for_specialists(&[], Duration::from_millis(20))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_wait_wakes_when_work_finishes() {
    let harness = TestSquad::new().unwrap();
    let squad = harness.squad.clone();

    let director = squad.create_director().await.unwrap();
    let specialist = squad
        .spawn_specialist(director.agent_id(), Specialization::Writer)
        .await
        .unwrap();
    let task = squad
        .assign_task_to_specialist(
            director.agent_id(),
            specialist.agent_id(),
            &TaskAssignment::new("Draft intro", "One paragraph"),
            None,
        )
        .await
        .unwrap();

    let worker = {
        let squad = squad.clone();
        tokio::spawn(async move { squad.run_specialist(&specialist).await })
    };
    let snapshot = squad
        .wait_for_specialists(&[task.assigned_to.unwrap()], Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(worker.await.unwrap().unwrap(), 1);
    assertions::assert_task_status(&snapshot[0], TaskStatus::Completed);
    assert_eq!(snapshot[0].result.as_deref(), Some("Mock response"));
}

#[tokio::test]
async fn test_run_director_checkpoints_token_usage() {
    let runner = MockRunner::new().with_fallback("Direct answer");
    let harness = TestSquad::with_runner(runner).unwrap();
    let squad = &harness.squad;

    let director = squad.create_director().await.unwrap();
    let answer = squad.run_director(&director, "Summarize X").await.unwrap();
    assert_eq!(answer, "Direct answer");

    let checkpoint = squad
        .checkpoints()
        .latest(director.agent_id())
        .await
        .unwrap()
        .unwrap();
    // ceil(11 / 4) input + ceil(13 / 4) output
    assert_eq!(checkpoint.tokens_used, 7);
    assert_eq!(checkpoint.resume_pointer.phase, "complete");
    assert_eq!(
        checkpoint.summary.completed,
        vec!["Task analysis", "Initial response generated"]
    );
    assert_eq!(
        squad
            .registry()
            .require_agent(director.agent_id())
            .await
            .unwrap()
            .status,
        AgentStatus::Completed
    );
}

#[tokio::test]
async fn test_specialist_requires_director_parent() {
    let harness = TestSquad::new().unwrap();
    let squad = &harness.squad;
    let director = squad.create_director().await.unwrap();
    let writer = squad
        .create_specialist(director.agent_id(), Specialization::Writer)
        .await
        .unwrap();

    let result = squad
        .create_specialist(writer.agent_id(), Specialization::General)
        .await;
    assertions::assert_agent_error(&result);

    let result = squad
        .initialize_agent(AgentConfig {
            parent_id: None,
            ..AgentConfig::specialist(director.agent_id(), Specialization::General)
        })
        .await;
    assertions::assert_missing_parent(&result);
}
