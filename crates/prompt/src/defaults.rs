//! Built-in personas.
//!
//! The dashboard and the HTTP service run the same answering agent with a
//! different persona. A YAML file with the same id under `.bocs/prompts/`
//! takes precedence.

use crate::types::{PromptBehavior, PromptContextConfig, PromptDefinition, PromptOutputSpec};

/// Persona used by the interactive dashboard.
pub const DASHBOARD_PERSONA: &str = "agent.dashboard";

/// Persona used by the HTTP service.
pub const SERVICE_PERSONA: &str = "agent.service";

/// Sentence the service persona answers with when nothing is found.
pub const NO_INFORMATION_FOUND: &str = "No information found in the official documents.";

const TEMPLATE: &str = "{{#if knowledgeContext}}Passages retrieved from the knowledge base:\n\
{{knowledgeContext}}\n\n{{/if}}{{prompt}}";

/// Ids of the built-in personas.
pub fn builtin_ids() -> Vec<&'static str> {
    vec![DASHBOARD_PERSONA, SERVICE_PERSONA]
}

/// Look up a built-in persona by id.
pub fn builtin(id: &str) -> Option<PromptDefinition> {
    match id {
        DASHBOARD_PERSONA => Some(dashboard()),
        SERVICE_PERSONA => Some(service()),
        _ => None,
    }
}

fn dashboard() -> PromptDefinition {
    PromptDefinition {
        id: DASHBOARD_PERSONA.to_string(),
        title: "Project and programme documents assistant".to_string(),
        api_version: "1.0".to_string(),
        created_by: "bocs".to_string(),
        description: "Agent specialised in the management of projects and programmes. \
                      It answers only from the official documents indexed in the knowledge base."
            .to_string(),
        instructions: vec![
            "Answer only from the documents indexed in the knowledge base.".to_string(),
            "Always cite the sources used.".to_string(),
            "Be precise and factual.".to_string(),
            "If the information is not found, say so clearly.".to_string(),
            "Answer in the language of the question.".to_string(),
        ],
        behavior: PromptBehavior::default(),
        context: PromptContextConfig::default(),
        template: TEMPLATE.to_string(),
        output: PromptOutputSpec::default(),
    }
}

fn service() -> PromptDefinition {
    PromptDefinition {
        id: SERVICE_PERSONA.to_string(),
        title: "Monitoring and evaluation office assistant".to_string(),
        api_version: "1.0".to_string(),
        created_by: "bocs".to_string(),
        description: "Agent of the monitoring and evaluation office specialised in official \
                      texts (decrees, orders, laws, reports). It queries only the vectorised \
                      knowledge base built from the official PDF documents and answers clearly, \
                      concisely and with sources."
            .to_string(),
        instructions: vec![
            "Answer only from the information present in the indexed official PDF documents. Do not invent anything.".to_string(),
            "Check that retrieved passages are present and relevant before answering.".to_string(),
            "Start with a direct, concise answer of three to six sentences.".to_string(),
            "Then add a \"Sources\" section listing the documents and pages used, for example: Sources: [FileName.pdf, p. 12-13].".to_string(),
            "When a question targets a specific article, cite its number and quote the key wording.".to_string(),
            "Mention dates (adoption, publication, entry into force) explicitly in DD/MM/YYYY format.".to_string(),
            "Use a professional, neutral and pedagogical tone. Greet briefly if the user greets, then get to the point.".to_string(),
            "If the question is vague, offer one or two short rephrasings.".to_string(),
            format!("If the information is not found, answer exactly: \"{}\" Then suggest in one sentence how to widen the search without leaving the official documents.", NO_INFORMATION_FOUND),
            "If documents contradict each other, say so and present both versions with their references.".to_string(),
            "Do not give legal advice or policy recommendations.".to_string(),
            "Never disclose identifiers, keys or endpoints.".to_string(),
            "Answer in the language of the question.".to_string(),
        ],
        behavior: PromptBehavior {
            tone: "neutral".to_string(),
            style: "concise".to_string(),
        },
        context: PromptContextConfig::default(),
        template: TEMPLATE.to_string(),
        output: PromptOutputSpec::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_resolve() {
        for id in builtin_ids() {
            let def = builtin(id).unwrap();
            assert_eq!(def.id, id);
            assert!(def.context.include_knowledge_base);
            assert!(def.system_message().is_some());
        }
        assert!(builtin("agent.unknown").is_none());
    }

    #[test]
    fn test_service_persona_has_fixed_fallback_sentence() {
        let system = builtin(SERVICE_PERSONA).unwrap().system_message().unwrap();
        assert!(system.contains(NO_INFORMATION_FOUND));
        assert!(system.contains("Sources"));
    }
}
