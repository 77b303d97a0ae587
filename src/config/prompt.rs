use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use log::info;

use crate::models::chat::ChatMode;

#[derive(Debug)]
pub enum PromptError {
    TemplateNotFound(String),
    ReloadError(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::TemplateNotFound(key) => write!(f, "Prompt template '{}' not found", key),
            PromptError::ReloadError(msg) => write!(f, "Prompt reload error: {}", msg),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

/// System prompt templates, one per chat mode. Templates may reference
/// `{user_name}` and `{category}`.
#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    pub system_templates: HashMap<String, String>,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        for mode in [ChatMode::ThoughtPartner, ChatMode::Reflection, ChatMode::Insights] {
            if !self.system_templates.contains_key(mode.as_str()) {
                return Err(
                    PromptError::TemplateNotFound(format!("system_templates:{}", mode.as_str()))
                );
            }
        }
        Ok(())
    }
}

static DEFAULT_PROMPTS: Lazy<Arc<PromptConfig>> = Lazy::new(|| {
    let mut system_templates = HashMap::new();
    system_templates.insert(
        ChatMode::ThoughtPartner.as_str().to_string(),
        "You are the LifeLedger thought partner, a decision-support coach for {user_name}.\n\
         Your main capabilities:\n\
         1. Help users think through upcoming decisions by surfacing options, trade-offs and biases\n\
         2. Ask clarifying questions before offering recommendations\n\
         3. Suggest concrete next steps the user can log in their decision journal\n\
         The current decision category is {category}.\n\
         Be conversational but grounded. Keep answers focused on the decision at hand.".to_string()
    );
    system_templates.insert(
        ChatMode::Reflection.as_str().to_string(),
        "You are the LifeLedger reflection guide for {user_name}.\n\
         Help the user review a past decision in the {category} category: what they expected,\n\
         what actually happened, and what they would do differently.\n\
         Ask one question at a time and summarize the lesson learned at the end.".to_string()
    );
    system_templates.insert(
        ChatMode::Insights.as_str().to_string(),
        "You are the LifeLedger insights analyst for {user_name}.\n\
         Look across the user's described decision history and point out recurring patterns,\n\
         strengths and blind spots, with an emphasis on the {category} category.\n\
         Be specific; cite the decisions the user mentioned rather than generalities.".to_string()
    );
    Arc::new(PromptConfig {
        system_templates,
        last_loaded: None,
    })
});

/// Compiled-in templates used when no prompts file is configured.
pub fn default_prompts() -> Arc<PromptConfig> {
    DEFAULT_PROMPTS.clone()
}

pub fn load_prompts(path: &str) -> Result<Arc<PromptConfig>, Box<dyn Error + Send + Sync>> {
    let file_content = fs
        ::read_to_string(path)
        .map_err(|e| format!("Failed to read prompts file '{}': {}", path, e))?;
    let mut config: PromptConfig = serde_json
        ::from_str(&file_content)
        .map_err(|e| format!("Failed to parse prompts file '{}': {}", path, e))?;
    config.validate().map_err(|e| format!("Invalid prompts file '{}': {}", path, e))?;
    config.last_loaded = Some(SystemTime::now());
    Ok(Arc::new(config))
}

pub fn reload_prompts_if_changed<P: AsRef<Path>>(
    path: P,
    current_config: &Arc<PromptConfig>
) -> Result<Option<Arc<PromptConfig>>, PromptError> {
    let metadata = fs::metadata(&path)?;
    let path_str = path
        .as_ref()
        .to_str()
        .ok_or_else(|| PromptError::ReloadError("non-utf8 prompts path".to_string()))?;

    if let Ok(modified) = metadata.modified() {
        if let Some(last_loaded) = current_config.last_loaded {
            if modified > last_loaded {
                info!("Prompts file changed, reloading...");
                let new_config = load_prompts(path_str).map_err(|e|
                    PromptError::ReloadError(e.to_string())
                )?;
                return Ok(Some(new_config));
            }
        } else {
            info!("No last_loaded timestamp, reloading prompts...");
            let new_config = load_prompts(path_str).map_err(|e|
                PromptError::ReloadError(e.to_string())
            )?;
            return Ok(Some(new_config));
        }
    }
    Ok(None)
}

/// Resolve the system prompt for a mode. `{user_name}` falls back to "User"
/// and `{category}` to "general", matching the web client's display fallback.
pub fn get_system_prompt(
    config: &PromptConfig,
    mode: ChatMode,
    user_name: Option<&str>,
    category: Option<&str>
) -> Result<String, PromptError> {
    let template = config.system_templates
        .get(mode.as_str())
        .map(|s| s.as_str())
        .ok_or_else(|| PromptError::TemplateNotFound(format!("system_templates:{}", mode.as_str())))?;

    let user_name = user_name.filter(|s| !s.trim().is_empty()).unwrap_or("User");
    let category = category.filter(|s| !s.trim().is_empty()).unwrap_or("general");

    Ok(template.replace("{user_name}", user_name).replace("{category}", category))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn defaults_cover_every_mode() {
        let config = default_prompts();
        assert!(config.validate().is_ok());
        for mode in [ChatMode::ThoughtPartner, ChatMode::Reflection, ChatMode::Insights] {
            let prompt = get_system_prompt(&config, mode, Some("Riley"), Some("Career")).unwrap();
            assert!(prompt.contains("Riley"));
            assert!(prompt.contains("Career"));
            assert!(!prompt.contains("{user_name}"));
            assert!(!prompt.contains("{category}"));
        }
    }

    #[test]
    fn missing_name_and_category_fall_back() {
        let config = default_prompts();
        let prompt = get_system_prompt(&config, ChatMode::ThoughtPartner, None, Some("  ")).unwrap();
        assert!(prompt.contains("User"));
        assert!(prompt.contains("general"));
    }

    #[test]
    fn load_rejects_incomplete_template_set() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            r#"{"system_templates": {"thought-partner": "hello {user_name}"}}"#
        ).unwrap();

        let result = load_prompts(file.path().to_str().unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn load_accepts_full_template_set() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            r#"{"system_templates": {
                "thought-partner": "a",
                "reflection": "b",
                "insights": "c"
            }}"#
        ).unwrap();

        let config = load_prompts(file.path().to_str().unwrap()).unwrap();
        assert!(config.last_loaded.is_some());
        assert_eq!(
            get_system_prompt(&config, ChatMode::Reflection, None, None).unwrap(),
            "b"
        );
    }
}
