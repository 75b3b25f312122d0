//! Persona prompts for the chatBOCS answering agent.
//!
//! This crate provides structured prompt management with:
//! - YAML-based persona definitions under `.bocs/prompts/`
//! - Built-in dashboard and service personas
//! - Handlebars template rendering
//! - Retrieved-passage context injection

pub mod builder;
pub mod defaults;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{build_prompt, CONTEXT_VARIABLE};
pub use defaults::{DASHBOARD_PERSONA, NO_INFORMATION_FOUND, SERVICE_PERSONA};
pub use loader::{list_prompts, load_prompt};
pub use types::{
    BuiltPrompt, PromptBehavior, PromptContextConfig, PromptDefinition, PromptOutputSpec,
};
