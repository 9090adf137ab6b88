//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use leadflow_core::Advisor;

use crate::{AutomationConfig, ConfigError, PointsTable};

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Response and abandonment windows
    #[serde(default)]
    pub sla: SlaConfig,

    #[serde(default)]
    pub qualification: QualificationConfig,

    /// Qualification script (hot-reloadable)
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Point values (hot-reloadable)
    #[serde(default)]
    pub points: PointsTable,

    /// Seed roster for the advisor directory
    #[serde(default)]
    pub advisors: Vec<AdvisorEntry>,

    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
}

impl Settings {
    /// Seed roster as directory entries
    pub fn roster(&self) -> Vec<Advisor> {
        self.advisors.iter().map(AdvisorEntry::to_advisor).collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_sla()?;
        self.validate_advisors()?;
        self.automation.validate()?;
        self.points.validate()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.environment.is_production()
            && self.server.cors_enabled
            && self.server.cors_origins.iter().any(|o| o == "*")
        {
            return Err(ConfigError::InvalidValue {
                field: "server.cors_origins".to_string(),
                message: "Wildcard origin not allowed in production".to_string(),
            });
        }

        Ok(())
    }

    fn validate_sla(&self) -> Result<(), ConfigError> {
        let sla = &self.sla;

        if sla.response_window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sla.response_window_secs".to_string(),
                message: "Response window must be positive".to_string(),
            });
        }

        if sla.abandonment_secs <= sla.response_window_secs {
            return Err(ConfigError::InvalidValue {
                field: "sla.abandonment_secs".to_string(),
                message: format!(
                    "Must be longer than the response window ({}s), got {}s",
                    sla.response_window_secs, sla.abandonment_secs
                ),
            });
        }

        if sla.flash_response_secs > sla.normal_response_secs {
            return Err(ConfigError::InvalidValue {
                field: "sla.flash_response_secs".to_string(),
                message: format!(
                    "Flash threshold ({}s) exceeds normal threshold ({}s)",
                    sla.flash_response_secs, sla.normal_response_secs
                ),
            });
        }

        if sla.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sla.sweep_interval_secs".to_string(),
                message: "Sweep interval must be positive".to_string(),
            });
        }

        if self.qualification.conversation_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "qualification.conversation_ttl_secs".to_string(),
                message: "Conversation TTL must be positive".to_string(),
            });
        }

        Ok(())
    }

    fn validate_advisors(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        let mut phones = HashSet::new();

        for advisor in &self.advisors {
            if !ids.insert(advisor.id) {
                return Err(ConfigError::InvalidValue {
                    field: "advisors".to_string(),
                    message: format!("Duplicate advisor id {}", advisor.id),
                });
            }
            if !phones.insert(advisor.phone.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "advisors".to_string(),
                    message: format!("Duplicate advisor phone {}", advisor.phone),
                });
            }
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Token echoed back during webhook subscription
    #[serde(default)]
    pub webhook_verify_token: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            webhook_verify_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON lines instead of human-readable logs
    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Time windows, all in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaConfig {
    /// Advisor must respond within this window after assignment
    #[serde(default = "default_response_window")]
    pub response_window_secs: u64,

    /// Inactivity horizon after which a lead is marked lost
    #[serde(default = "default_abandonment")]
    pub abandonment_secs: u64,

    /// Responses strictly faster than this earn the flash bonus
    #[serde(default = "default_flash_response")]
    pub flash_response_secs: u64,

    /// Responses at or under this earn the normal bonus
    #[serde(default = "default_normal_response")]
    pub normal_response_secs: u64,

    /// Period of the overdue sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_response_window() -> u64 {
    600
}

fn default_abandonment() -> u64 {
    72 * 3600
}

fn default_flash_response() -> u64 {
    300
}

fn default_normal_response() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    30
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            response_window_secs: default_response_window(),
            abandonment_secs: default_abandonment(),
            flash_response_secs: default_flash_response(),
            normal_response_secs: default_normal_response(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl SlaConfig {
    pub fn response_window(&self) -> chrono::Duration {
        secs(self.response_window_secs)
    }

    pub fn abandonment(&self) -> chrono::Duration {
        secs(self.abandonment_secs)
    }

    pub fn flash_response(&self) -> chrono::Duration {
        secs(self.flash_response_secs)
    }

    pub fn normal_response(&self) -> chrono::Duration {
        secs(self.normal_response_secs)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

fn secs(value: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1000))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualificationConfig {
    /// Idle conversations expire after this long
    #[serde(default = "default_conversation_ttl")]
    pub conversation_ttl_secs: u64,

    /// Source tag stored on every created lead
    #[serde(default = "default_lead_source")]
    pub lead_source: String,

    /// Used when the prospect's profile name is unknown
    #[serde(default = "default_placeholder_prefix")]
    pub placeholder_name_prefix: String,
}

fn default_conversation_ttl() -> u64 {
    24 * 3600
}

fn default_lead_source() -> String {
    "whatsapp".to_string()
}

fn default_placeholder_prefix() -> String {
    "Prospecto".to_string()
}

impl Default for QualificationConfig {
    fn default() -> Self {
        Self {
            conversation_ttl_secs: default_conversation_ttl(),
            lead_source: default_lead_source(),
            placeholder_name_prefix: default_placeholder_prefix(),
        }
    }
}

impl QualificationConfig {
    pub fn conversation_ttl(&self) -> chrono::Duration {
        secs(self.conversation_ttl_secs)
    }
}

/// One advisor in the seed roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorEntry {
    pub id: u64,
    pub name: String,
    pub phone: String,
    #[serde(default = "default_true")]
    pub available: bool,
}

impl AdvisorEntry {
    pub fn to_advisor(&self) -> Advisor {
        Advisor {
            id: self.id,
            name: self.name.clone(),
            phone: self.phone.clone(),
            available: self.available,
        }
    }
}

/// WhatsApp Cloud API outbound settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// When false, outbound messages go to the simulated outbox
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default)]
    pub phone_number_id: String,

    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: default_api_base(),
            phone_number_id: String::new(),
            access_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Load settings from `config/` under the working directory
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from a config directory
///
/// Layers, later wins: `{dir}/default`, `{dir}/{env}`, then `LEADFLOW__*`
/// environment variables.
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::from(dir.join("default")).required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::from(dir.join(env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("LEADFLOW")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        environment = ?settings.environment,
        advisors = settings.advisors.len(),
        questions = settings.automation.questions.len(),
        "Settings loaded"
    );

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.sla.response_window_secs, 600);
        assert_eq!(settings.sla.abandonment_secs, 259_200);
        assert_eq!(settings.qualification.lead_source, "whatsapp");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_sla_validation() {
        let mut settings = Settings::default();
        settings.sla.response_window_secs = 0;
        assert!(settings.validate().is_err());

        settings.sla.response_window_secs = 600;
        settings.sla.abandonment_secs = 600;
        assert!(settings.validate().is_err());

        settings.sla.abandonment_secs = 259_200;
        settings.sla.flash_response_secs = 900;
        assert!(settings.validate().is_err());

        settings.sla.flash_response_secs = 300;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_duplicate_advisors_rejected() {
        let mut settings = Settings::default();
        settings.advisors = vec![
            AdvisorEntry {
                id: 1,
                name: "Ana".into(),
                phone: "5215500000001".into(),
                available: true,
            },
            AdvisorEntry {
                id: 2,
                name: "Luis".into(),
                phone: "5215500000001".into(),
                available: true,
            },
        ];
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate advisor phone"));

        settings.advisors[1].phone = "5215500000002".into();
        settings.advisors[1].id = 1;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate advisor id"));
    }

    #[test]
    fn test_port_zero_rejected() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_window_conversions() {
        let sla = SlaConfig::default();
        assert_eq!(sla.response_window(), chrono::Duration::minutes(10));
        assert_eq!(sla.abandonment(), chrono::Duration::hours(72));
        assert_eq!(sla.flash_response(), chrono::Duration::minutes(5));
    }

    #[test]
    fn test_load_layered_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.yaml"),
            r#"
sla:
  response_window_secs: 900
advisors:
  - id: 1
    name: Ana
    phone: "5215500000001"
automation:
  questions: ["Q1", "Q2"]
"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("staging.yaml"),
            "environment: staging\nsla:\n  sweep_interval_secs: 5\n",
        )
        .unwrap();

        let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(settings.environment, RuntimeEnvironment::Staging);
        assert_eq!(settings.sla.response_window_secs, 900);
        assert_eq!(settings.sla.sweep_interval_secs, 5);
        assert_eq!(settings.advisors.len(), 1);
        assert!(settings.advisors[0].available);
        assert_eq!(settings.automation.questions, vec!["Q1", "Q2"]);
    }

    #[test]
    fn test_load_missing_dir_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(&dir.path().join("absent"), None).unwrap();
        assert_eq!(settings.server.port, 8080);
    }
}
