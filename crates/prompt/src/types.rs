//! Persona definitions and rendered prompts.
//!
//! A persona is who the answering agent is (`description`), the rules it
//! follows (`instructions`) and the template the question and retrieved
//! passages are rendered through.

use serde::{Deserialize, Serialize};

/// A persona loaded from `.bocs/prompts/<id>.yml` or taken from the built-ins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDefinition {
    pub id: String,

    pub title: String,

    /// `major.minor` version of the persona file format
    pub api_version: String,

    #[serde(default)]
    pub created_by: String,

    #[serde(default)]
    pub description: String,

    /// Rules the agent follows, in order
    #[serde(default)]
    pub instructions: Vec<String>,

    #[serde(default)]
    pub behavior: PromptBehavior,

    #[serde(default)]
    pub context: PromptContextConfig,

    /// Handlebars template for the user turn; sees `prompt` and
    /// `knowledgeContext`
    pub template: String,

    #[serde(default)]
    pub output: PromptOutputSpec,
}

/// Tone and style, stated to the model in the system message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptBehavior {
    pub tone: String,
    pub style: String,
}

impl Default for PromptBehavior {
    fn default() -> Self {
        Self {
            tone: "professional".to_string(),
            style: "concise".to_string(),
        }
    }
}

/// Whether retrieved passages are injected into the template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptContextConfig {
    #[serde(default = "default_true")]
    pub include_knowledge_base: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_base_name: Option<String>,
}

impl Default for PromptContextConfig {
    fn default() -> Self {
        Self {
            include_knowledge_base: true,
            knowledge_base_name: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Answer format requested from the model ("markdown", "text").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutputSpec {
    pub format: String,
}

impl Default for PromptOutputSpec {
    fn default() -> Self {
        Self {
            format: "markdown".to_string(),
        }
    }
}

impl PromptDefinition {
    /// Description, then the rules, then tone, style and format.
    /// `None` when the persona says nothing at all.
    pub fn system_message(&self) -> Option<String> {
        let mut sections = Vec::new();

        let description = self.description.trim();
        if !description.is_empty() {
            sections.push(description.to_string());
        }

        if !self.instructions.is_empty() {
            let rules: Vec<String> = self
                .instructions
                .iter()
                .map(|rule| format!("- {}", rule))
                .collect();
            sections.push(format!("Instructions:\n{}", rules.join("\n")));
        }

        if sections.is_empty() {
            return None;
        }

        sections.push(format!(
            "Tone: {}. Style: {}. Format: {}.",
            self.behavior.tone, self.behavior.style, self.output.format
        ));
        Some(sections.join("\n\n"))
    }
}

/// A rendered prompt ready to send to the chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltPrompt {
    pub system: Option<String>,

    pub user: String,

    /// Id of the persona the prompt was rendered from
    pub persona: String,

    /// Knowledge base whose passages were injected, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_base: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona(description: &str, instructions: &[&str]) -> PromptDefinition {
        PromptDefinition {
            id: "agent.test".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            created_by: String::new(),
            description: description.to_string(),
            instructions: instructions.iter().map(|s| s.to_string()).collect(),
            behavior: PromptBehavior::default(),
            context: PromptContextConfig::default(),
            template: "{{prompt}}".to_string(),
            output: PromptOutputSpec::default(),
        }
    }

    #[test]
    fn test_system_message_sections() {
        let system = persona("Documents assistant.", &["Cite sources.", "Be brief."])
            .system_message()
            .unwrap();
        assert_eq!(
            system,
            "Documents assistant.\n\nInstructions:\n- Cite sources.\n- Be brief.\n\n\
             Tone: professional. Style: concise. Format: markdown."
        );
    }

    #[test]
    fn test_empty_persona_has_no_system_message() {
        assert!(persona("  ", &[]).system_message().is_none());
    }

    #[test]
    fn test_yaml_field_names() {
        let def: PromptDefinition = serde_yaml::from_str(
            "id: x\ntitle: X\napiVersion: \"1.0\"\ntemplate: \"{{prompt}}\"\n\
             context:\n  includeKnowledgeBase: false\n",
        )
        .unwrap();
        assert_eq!(def.api_version, "1.0");
        assert!(!def.context.include_knowledge_base);
        assert_eq!(def.output.format, "markdown");
    }
}
