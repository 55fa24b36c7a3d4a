//! Completion runner over the Anthropic Messages API

use super::client::AnthropicClient;
use super::types::{Message, MessageRequest, MessageResponse};
use crate::prompt::{build_system_prompt, load_skill_content, SystemPromptInput};
use crate::{CompletionRunner, MessageCallback, RunConfig, RunResult, TokenUsage};
use async_trait::async_trait;
use squad_core::{short_id, RunnerConfig, SquadResult};
use tracing::info;

/// Runs agent tasks against Claude.
pub struct AnthropicRunner {
    client: AnthropicClient,
    config: RunnerConfig,
}

impl AnthropicRunner {
    pub fn new(api_key: impl Into<String>, config: RunnerConfig) -> Self {
        Self {
            client: AnthropicClient::new(api_key, 50),
            config,
        }
    }

    pub fn with_client(client: AnthropicClient, config: RunnerConfig) -> Self {
        Self { client, config }
    }

    fn request_for(&self, run: &RunConfig) -> MessageRequest {
        let skill_content =
            load_skill_content(&self.config.skills_dir, run.agent_type, run.specialization);
        let system = build_system_prompt(&SystemPromptInput {
            agent_id: run.agent_id,
            agent_type: run.agent_type,
            specialization: run.specialization,
            skill_content: &skill_content,
            resume_context: run.resume_context.as_deref(),
        });
        MessageRequest {
            model: self.config.model.clone(),
            messages: vec![Message::user(run.task.clone())],
            max_tokens: self.config.max_tokens,
            system: Some(system),
        }
    }
}

#[async_trait]
impl CompletionRunner for AnthropicRunner {
    async fn run(
        &self,
        config: &RunConfig,
        on_message: Option<MessageCallback<'_>>,
    ) -> SquadResult<RunResult> {
        info!(
            agent_id = %short_id(&config.agent_id),
            agent_type = %config.agent_type,
            specialization = ?config.specialization,
            "Running completion"
        );

        let request = self.request_for(config);
        let response: MessageResponse = self.client.request("messages", &request).await?;
        let content = response.text();

        if let Some(callback) = on_message {
            callback(&content);
        }

        info!(
            agent_id = %short_id(&config.agent_id),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Completion finished"
        );

        Ok(RunResult {
            content,
            stop_reason: response
                .stop_reason
                .unwrap_or_else(|| "unknown".to_string()),
            usage: TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
        })
    }
}

impl std::fmt::Debug for AnthropicRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicRunner")
            .field("model", &self.config.model)
            .field("client", &self.client)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squad_core::{new_entity_id, AgentRole, Specialization};

    #[test]
    fn test_request_carries_prompt_and_task() {
        let runner = AnthropicRunner::new("sk-ant-test", RunnerConfig::default());
        let run = RunConfig::new(new_entity_id(), AgentRole::Specialist, "Summarize X")
            .with_specialization(Specialization::General)
            .with_resume_context(Some("**Goal:** X".to_string()));
        let request = runner.request_for(&run);

        assert_eq!(request.model, "claude-sonnet-4-20250514");
        assert_eq!(request.max_tokens, 4096);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].content, "Summarize X");
        let system = request.system.unwrap();
        assert!(system.contains("- **Specialization:** general"));
        assert!(system.contains("**Goal:** X"));
    }
}
