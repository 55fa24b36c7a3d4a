//! Squad LLM - Completion Capability
//!
//! Provider-agnostic trait for "run a task, get text and token usage",
//! plus system prompt assembly and concrete runners.

pub mod mock;
pub mod prompt;
pub mod providers;

pub use mock::MockRunner;
pub use prompt::{build_system_prompt, load_skill_content, SystemPromptInput};
pub use providers::{AnthropicClient, AnthropicRunner};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use squad_core::{AgentId, AgentRole, SquadResult, Specialization};

// ============================================================================
// RUN TYPES
// ============================================================================

/// One completion request on behalf of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub agent_id: AgentId,
    pub agent_type: AgentRole,
    pub specialization: Option<Specialization>,
    /// User turn sent to the model
    pub task: String,
    /// Rendered checkpoint briefing, folded into the system prompt
    pub resume_context: Option<String>,
}

impl RunConfig {
    pub fn new(agent_id: AgentId, agent_type: AgentRole, task: impl Into<String>) -> Self {
        Self {
            agent_id,
            agent_type,
            specialization: None,
            task: task.into(),
            resume_context: None,
        }
    }

    pub fn with_specialization(mut self, specialization: Specialization) -> Self {
        self.specialization = Some(specialization);
        self
    }

    pub fn with_resume_context(mut self, resume_context: Option<String>) -> Self {
        self.resume_context = resume_context;
        self
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl TokenUsage {
    pub fn total(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }
}

/// Completion output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub content: String,
    pub stop_reason: String,
    pub usage: TokenUsage,
}

/// Callback receiving the completed text.
pub type MessageCallback<'a> = &'a (dyn Fn(&str) + Send + Sync);

// ============================================================================
// COMPLETION RUNNER TRAIT
// ============================================================================

/// Opaque completion capability.
///
/// Failures are `SquadError::Llm` and are propagated unchanged; runners
/// never retry.
#[async_trait]
pub trait CompletionRunner: Send + Sync {
    async fn run(
        &self,
        config: &RunConfig,
        on_message: Option<MessageCallback<'_>>,
    ) -> SquadResult<RunResult>;
}

/// Rough token estimate used where no provider count is available.
pub fn estimate_tokens(text: &str) -> i64 {
    text.chars().count().div_ceil(4) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_usage_total() {
        let usage = TokenUsage {
            input_tokens: 120,
            output_tokens: 30,
        };
        assert_eq!(usage.total(), 150);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_estimate_covers_text(text in ".{0,200}") {
            let chars = text.chars().count() as i64;
            let estimate = estimate_tokens(&text);
            prop_assert!(estimate * 4 >= chars);
            prop_assert!(estimate * 4 < chars + 4);
        }
    }
}
