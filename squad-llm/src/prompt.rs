//! System prompt assembly and skill loading

use squad_core::{AgentId, AgentRole, Specialization};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Inputs for [`build_system_prompt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPromptInput<'a> {
    pub agent_id: AgentId,
    pub agent_type: AgentRole,
    pub specialization: Option<Specialization>,
    pub skill_content: &'a str,
    pub resume_context: Option<&'a str>,
}

/// Coordination tools advertised to every agent.
const COORDINATION_TOOLS: &[&str] = &[
    "- `checkInbox()` - Get unread messages from other agents",
    "- `sendMessage(toAgentId, content, type)` - Send message to another agent",
    "- `checkpoint(summary, resumePointer)` - Save your state for potential resume",
    "- `createTask(title, description)` - Create a new work unit",
    "- `assignTask(taskId, agentId)` - Assign task to a specialist",
    "- `completeTask(taskId, result)` - Mark task as completed with result",
];

/// Skill file for an agent, relative to `skills_dir`. General specialists
/// have none.
pub fn skill_path(
    skills_dir: &Path,
    agent_type: AgentRole,
    specialization: Option<Specialization>,
) -> Option<PathBuf> {
    match (agent_type, specialization) {
        (AgentRole::Director, _) => Some(skills_dir.join("director").join("SKILL.md")),
        (AgentRole::Specialist, Some(spec)) if spec != Specialization::General => Some(
            skills_dir
                .join("specialist")
                .join(spec.as_db_str())
                .join("SKILL.md"),
        ),
        (AgentRole::Specialist, _) => None,
    }
}

/// Load skill content. Missing or unreadable files yield an empty string.
pub fn load_skill_content(
    skills_dir: &Path,
    agent_type: AgentRole,
    specialization: Option<Specialization>,
) -> String {
    let Some(path) = skill_path(skills_dir, agent_type, specialization) else {
        return String::new();
    };
    if !path.exists() {
        debug!(path = %path.display(), "Skill file not found");
        return String::new();
    }
    match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to load skill file");
            String::new()
        }
    }
}

/// Render the system prompt: skill content, identity, tools, and the
/// resume briefing when present.
pub fn build_system_prompt(input: &SystemPromptInput<'_>) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !input.skill_content.is_empty() {
        sections.push(input.skill_content.to_string());
        sections.push(String::new());
        sections.push("---".to_string());
        sections.push(String::new());
    }

    sections.push("## Agent Identity".to_string());
    sections.push(String::new());
    sections.push(format!("- **Agent ID:** {}", input.agent_id));
    sections.push(format!("- **Type:** {}", input.agent_type));
    if let Some(spec) = input.specialization {
        sections.push(format!("- **Specialization:** {}", spec));
    }
    sections.push(String::new());

    sections.push("## Available Tools".to_string());
    sections.push(String::new());
    sections.push("You have access to Squad coordination tools:".to_string());
    sections.push(String::new());
    sections.extend(COORDINATION_TOOLS.iter().map(|t| t.to_string()));
    sections.push(String::new());

    if let Some(resume) = input.resume_context.filter(|r| !r.is_empty()) {
        sections.push("---".to_string());
        sections.push(String::new());
        sections.push("## Resuming from Previous Session".to_string());
        sections.push(String::new());
        sections.push(resume.to_string());
    }

    sections.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use squad_core::new_entity_id;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("squad-skills-{}", new_entity_id()))
    }

    #[test]
    fn test_skill_paths() {
        let root = Path::new("skills");
        assert_eq!(
            skill_path(root, AgentRole::Director, None),
            Some(root.join("director").join("SKILL.md"))
        );
        assert_eq!(
            skill_path(root, AgentRole::Specialist, Some(Specialization::Writer)),
            Some(root.join("specialist").join("writer").join("SKILL.md"))
        );
        assert_eq!(
            skill_path(root, AgentRole::Specialist, Some(Specialization::General)),
            None
        );
        assert_eq!(skill_path(root, AgentRole::Specialist, None), None);
    }

    #[test]
    fn test_missing_skill_is_empty() {
        let dir = scratch_dir();
        assert_eq!(load_skill_content(&dir, AgentRole::Director, None), "");
    }

    #[test]
    fn test_skill_is_loaded() {
        let dir = scratch_dir();
        let file = dir.join("specialist").join("analyst").join("SKILL.md");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "# Analyst skill").unwrap();

        let content = load_skill_content(&dir, AgentRole::Specialist, Some(Specialization::Analyst));
        assert_eq!(content, "# Analyst skill");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_prompt_sections() {
        let agent_id = new_entity_id();
        let prompt = build_system_prompt(&SystemPromptInput {
            agent_id,
            agent_type: AgentRole::Specialist,
            specialization: Some(Specialization::Researcher),
            skill_content: "SKILL BODY",
            resume_context: Some("## Resuming from Checkpoint"),
        });

        assert!(prompt.starts_with("SKILL BODY\n\n---\n\n## Agent Identity"));
        assert!(prompt.contains(&format!("- **Agent ID:** {}", agent_id)));
        assert!(prompt.contains("- **Type:** specialist"));
        assert!(prompt.contains("- **Specialization:** researcher"));
        assert!(prompt.contains("`checkInbox()`"));
        assert!(prompt.ends_with("## Resuming from Previous Session\n\n## Resuming from Checkpoint"));
    }

    #[test]
    fn test_prompt_without_skill_or_resume() {
        let prompt = build_system_prompt(&SystemPromptInput {
            agent_id: new_entity_id(),
            agent_type: AgentRole::Director,
            specialization: None,
            skill_content: "",
            resume_context: None,
        });
        assert!(prompt.starts_with("## Agent Identity"));
        assert!(!prompt.contains("Specialization"));
        assert!(!prompt.contains("Resuming"));
    }
}
