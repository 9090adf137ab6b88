//! Qualification script configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use leadflow_core::ConversationScript;

use crate::ConfigError;

/// Scripted qualification flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// When false, unknown phones are ignored and no conversation starts
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Ordered prompts
    #[serde(default = "default_questions")]
    pub questions: Vec<String>,

    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,

    #[serde(default = "default_completion_message")]
    pub completion_message: String,
}

fn default_true() -> bool {
    true
}

fn default_questions() -> Vec<String> {
    vec![
        "¿Qué tipo de propiedad buscas? (casa, departamento, terreno)".to_string(),
        "¿Cuál es tu presupuesto aproximado?".to_string(),
        "¿Para cuándo planeas comprar?".to_string(),
    ]
}

fn default_welcome_message() -> String {
    "¡Hola! Gracias por escribirnos. Te haremos unas preguntas rápidas para ayudarte mejor."
        .to_string()
}

fn default_completion_message() -> String {
    "¡Gracias! Un asesor se pondrá en contacto contigo en breve.".to_string()
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            is_active: true,
            questions: default_questions(),
            welcome_message: default_welcome_message(),
            completion_message: default_completion_message(),
        }
    }
}

impl AutomationConfig {
    /// Load a standalone automation script from YAML
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Frozen copy handed to a new conversation
    pub fn snapshot(&self) -> ConversationScript {
        ConversationScript {
            questions: self.questions.clone(),
            completion_message: self.completion_message.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_active && self.welcome_message.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "automation.welcome_message".to_string(),
                message: "Must not be empty while automation is active".to_string(),
            });
        }
        if self.questions.iter().any(|q| q.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "automation.questions".to_string(),
                message: "Questions must not be blank".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_snapshot_copies_script() {
        let config = AutomationConfig::default();
        let script = config.snapshot();
        assert_eq!(script.questions, config.questions);
        assert_eq!(script.completion_message, config.completion_message);
    }

    #[test]
    fn test_active_requires_welcome() {
        let mut config = AutomationConfig::default();
        config.welcome_message = "  ".to_string();
        assert!(config.validate().is_err());

        config.is_active = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "is_active: true\nquestions: [Q1, Q2, Q3]\nwelcome_message: Hola\ncompletion_message: Listo"
        )
        .unwrap();

        let config = AutomationConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.questions, vec!["Q1", "Q2", "Q3"]);
        assert_eq!(config.welcome_message, "Hola");
    }

    #[test]
    fn test_missing_file() {
        let err = AutomationConfig::from_yaml_file("/nonexistent/automation.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
