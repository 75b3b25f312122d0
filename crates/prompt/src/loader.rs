//! Prompt loader for YAML persona definitions.

use crate::defaults;
use crate::types::PromptDefinition;
use bocs_core::config::STATE_DIR;
use bocs_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(STATE_DIR).join("prompts")
}

/// Load a persona by ID.
///
/// Looks for `<id>.yml` in `.bocs/prompts/` first and falls back to the
/// built-in persona with the same id.
///
/// # Example
/// ```no_run
/// use bocs_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "agent.dashboard")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return match defaults::builtin(prompt_id) {
            Some(definition) => {
                tracing::debug!("Using built-in prompt: {}", prompt_id);
                Ok(definition)
            }
            None => {
                let available = list_prompts(workspace_path).unwrap_or_default();
                Err(AppError::Prompt(format!(
                    "Unknown persona '{}' (available: {})",
                    prompt_id,
                    available.join(", ")
                )))
            }
        };
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// List all available prompt IDs: workspace files plus built-ins, sorted.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let mut prompt_ids: Vec<String> = defaults::builtin_ids()
        .into_iter()
        .map(str::to_string)
        .collect();

    let dir = prompts_dir(workspace_path);
    if dir.exists() {
        for entry in walkdir::WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    prompt_ids.push(stem.to_string());
                }
            }
        }
    }

    prompt_ids.sort();
    prompt_ids.dedup();
    Ok(prompt_ids)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_prompt(dir: &Path, id: &str, content: &str) {
        let prompts = prompts_dir(dir);
        fs::create_dir_all(&prompts).unwrap();
        fs::write(prompts.join(format!("{}.yml", id)), content).unwrap();
    }

    fn valid_yaml(id: &str) -> String {
        format!(
            r#"
id: {}
title: "Test Prompt"
apiVersion: "1.0"
description: Local persona.
template: "Q: {{{{prompt}}}}"
"#,
            id
        )
    }

    #[test]
    fn test_load_valid_prompt() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "test.prompt", &valid_yaml("test.prompt"));

        let prompt = load_prompt(temp_dir.path(), "test.prompt").unwrap();
        assert_eq!(prompt.id, "test.prompt");
        assert_eq!(prompt.template, "Q: {{prompt}}");
    }

    #[test]
    fn test_workspace_file_overrides_builtin() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            defaults::DASHBOARD_PERSONA,
            &valid_yaml(defaults::DASHBOARD_PERSONA),
        );

        let prompt = load_prompt(temp_dir.path(), defaults::DASHBOARD_PERSONA).unwrap();
        assert_eq!(prompt.description, "Local persona.");
    }

    #[test]
    fn test_builtin_fallback() {
        let temp_dir = TempDir::new().unwrap();
        let prompt = load_prompt(temp_dir.path(), defaults::SERVICE_PERSONA).unwrap();
        assert_eq!(prompt.id, defaults::SERVICE_PERSONA);
    }

    #[test]
    fn test_unknown_persona_lists_available() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "legal", &valid_yaml("legal"));

        let err = load_prompt(temp_dir.path(), "nonexistent").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Prompt error: Unknown persona 'nonexistent' (available: agent.dashboard, agent.service, legal)"
        );
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "invalid", "invalid: yaml: content:");
        assert!(load_prompt(temp_dir.path(), "invalid").is_err());
    }

    #[test]
    fn test_invalid_api_version_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = valid_yaml("bad.version").replace("\"1.0\"", "\"1\"");
        write_prompt(temp_dir.path(), "bad.version", &yaml);
        assert!(load_prompt(temp_dir.path(), "bad.version").is_err());
    }

    #[test]
    fn test_list_prompts_includes_builtins() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "prompt1", &valid_yaml("prompt1"));
        write_prompt(
            temp_dir.path(),
            defaults::SERVICE_PERSONA,
            &valid_yaml(defaults::SERVICE_PERSONA),
        );

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(
            prompts,
            vec![
                "agent.dashboard".to_string(),
                "agent.service".to_string(),
                "prompt1".to_string()
            ]
        );
    }
}
