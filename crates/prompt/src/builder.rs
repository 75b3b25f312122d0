//! Renders a persona template with the question and retrieved passages.

use crate::types::{BuiltPrompt, PromptDefinition};
use bocs_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

/// Template variable holding the retrieved passages.
pub const CONTEXT_VARIABLE: &str = "knowledgeContext";

/// Render `definition` with `variables`.
///
/// `knowledge_context` is injected as `knowledgeContext` when the persona
/// asks for it and dropped otherwise.
///
/// ```no_run
/// use bocs_prompt::{build_prompt, load_prompt, DASHBOARD_PERSONA};
/// use std::collections::HashMap;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let persona = load_prompt(Path::new("."), DASHBOARD_PERSONA)?;
/// let vars = HashMap::from([("prompt".to_string(), "Which decree?".to_string())]);
/// let built = build_prompt(&persona, vars, Some("[decree p.2] ...".to_string()))?;
/// println!("{}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    mut variables: HashMap<String, String>,
    knowledge_context: Option<String>,
) -> AppResult<BuiltPrompt> {
    let wants_context = definition.context.include_knowledge_base;
    let knowledge_base = match knowledge_context {
        Some(passages) if wants_context => {
            variables.insert(CONTEXT_VARIABLE.to_string(), passages);
            Some(
                definition
                    .context
                    .knowledge_base_name
                    .clone()
                    .unwrap_or_default(),
            )
        }
        Some(_) => {
            tracing::debug!("Persona {} ignores retrieved passages", definition.id);
            None
        }
        None => None,
    };

    let user = render(&definition.template, &variables)?;
    tracing::debug!(
        "Rendered persona {} ({} chars)",
        definition.id,
        user.chars().count()
    );

    Ok(BuiltPrompt {
        system: definition.system_message(),
        user,
        persona: definition.id.clone(),
        knowledge_base,
    })
}

fn render(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut registry = Handlebars::new();
    // Prompts are plain text.
    registry.register_escape_fn(handlebars::no_escape);

    registry
        .render_template(template, variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{builtin, DASHBOARD_PERSONA};

    fn question(text: &str) -> HashMap<String, String> {
        HashMap::from([("prompt".to_string(), text.to_string())])
    }

    #[test]
    fn test_plain_text_rendering() {
        let rendered = render("{{prompt}}", &question("a < b & \"c\"")).unwrap();
        assert_eq!(rendered, "a < b & \"c\"");

        // Unknown variables render empty.
        assert_eq!(render("Q: {{missing}}", &HashMap::new()).unwrap(), "Q: ");
    }

    #[test]
    fn test_passages_are_injected() {
        let mut persona = builtin(DASHBOARD_PERSONA).unwrap();
        persona.context.knowledge_base_name = Some("bocs".to_string());

        let built = build_prompt(
            &persona,
            question("What are the axes?"),
            Some("[report p.3] Four strategic axes.".to_string()),
        )
        .unwrap();

        assert!(built.user.contains("[report p.3] Four strategic axes."));
        assert!(built.user.ends_with("What are the axes?"));
        assert_eq!(built.persona, DASHBOARD_PERSONA);
        assert_eq!(built.knowledge_base.as_deref(), Some("bocs"));
        assert!(built.system.unwrap().contains("Always cite the sources used."));
    }

    #[test]
    fn test_passages_dropped_when_persona_opts_out() {
        let mut persona = builtin(DASHBOARD_PERSONA).unwrap();
        persona.context.include_knowledge_base = false;

        let built = build_prompt(
            &persona,
            question("Hello"),
            Some("[report p.3] ignored".to_string()),
        )
        .unwrap();
        assert_eq!(built.user, "Hello");
        assert!(built.knowledge_base.is_none());
    }

    #[test]
    fn test_unclosed_block_is_prompt_error() {
        let err = render("{{#if prompt}}open", &question("x")).unwrap_err();
        assert!(matches!(err, AppError::Prompt(_)));
    }
}
