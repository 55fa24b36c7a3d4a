//! Scripted completion runner for tests and offline runs.

use crate::{estimate_tokens, CompletionRunner, MessageCallback, RunConfig, RunResult, TokenUsage};
use async_trait::async_trait;
use squad_core::{LlmError, SquadResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Responder = Arc<dyn Fn(&RunConfig) -> String + Send + Sync>;

#[derive(Default)]
struct MockState {
    queue: VecDeque<Result<String, LlmError>>,
    failure: Option<LlmError>,
    calls: Vec<RunConfig>,
}

/// Completion runner answering from a script.
///
/// Resolution order per call: forced failure, queued responses, the
/// responder function, then the fixed fallback. Clones share state.
#[derive(Clone)]
pub struct MockRunner {
    state: Arc<Mutex<MockState>>,
    responder: Option<Responder>,
    fallback: String,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            responder: None,
            fallback: "Mock response".to_string(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Compute the response from the request.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&RunConfig) -> String + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_response(&self, content: impl Into<String>) {
        self.lock().queue.push_back(Ok(content.into()));
    }

    pub fn push_error(&self, error: LlmError) {
        self.lock().queue.push_back(Err(error));
    }

    /// Fail every call with `error` until cleared with `None`.
    pub fn fail_with(&self, error: Option<LlmError>) {
        self.lock().failure = error;
    }

    pub fn calls(&self) -> Vec<RunConfig> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }
}

impl std::fmt::Debug for MockRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRunner")
            .field("fallback", &self.fallback)
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CompletionRunner for MockRunner {
    async fn run(
        &self,
        config: &RunConfig,
        on_message: Option<MessageCallback<'_>>,
    ) -> SquadResult<RunResult> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(config.clone());
            match state.failure.clone() {
                Some(error) => Some(Err(error)),
                None => state.queue.pop_front(),
            }
        };

        let content = match scripted {
            Some(Ok(content)) => content,
            Some(Err(error)) => return Err(error.into()),
            None => match &self.responder {
                Some(responder) => responder(config),
                None => self.fallback.clone(),
            },
        };

        if let Some(callback) = on_message {
            callback(&content);
        }
        Ok(RunResult {
            usage: TokenUsage {
                input_tokens: estimate_tokens(&config.task),
                output_tokens: estimate_tokens(&content),
            },
            content,
            stop_reason: "end_turn".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squad_core::{new_entity_id, AgentRole, SquadError};

    fn run_config(task: &str) -> RunConfig {
        RunConfig::new(new_entity_id(), AgentRole::Director, task)
    }

    #[tokio::test]
    async fn test_queue_then_fallback() {
        let runner = MockRunner::new().with_fallback("done");
        runner.push_response("first");

        let a = runner.run(&run_config("a"), None).await.unwrap();
        let b = runner.run(&run_config("b"), None).await.unwrap();
        assert_eq!(a.content, "first");
        assert_eq!(b.content, "done");
        assert_eq!(runner.call_count(), 2);
        assert_eq!(runner.calls()[1].task, "b");
    }

    #[tokio::test]
    async fn test_responder_sees_request() {
        let runner = MockRunner::new().with_responder(|run| format!("echo: {}", run.task));
        let result = runner.run(&run_config("ping"), None).await.unwrap();
        assert_eq!(result.content, "echo: ping");
        assert_eq!(result.usage.output_tokens, estimate_tokens("echo: ping"));
    }

    #[tokio::test]
    async fn test_failure_propagates_unchanged() {
        let runner = MockRunner::new();
        let error = LlmError::RateLimited {
            provider: "mock".to_string(),
        };
        runner.fail_with(Some(error.clone()));
        let err = runner.run(&run_config("x"), None).await.unwrap_err();
        assert_eq!(err, SquadError::Llm(error));

        runner.fail_with(None);
        assert!(runner.run(&run_config("x"), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_callback_receives_content() {
        let runner = MockRunner::new().with_fallback("streamed");
        let seen = Mutex::new(String::new());
        let callback = |chunk: &str| seen.lock().unwrap().push_str(chunk);
        runner.run(&run_config("x"), Some(&callback)).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), "streamed");
    }
}
