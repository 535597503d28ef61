use crate::models::Role;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// Environment variable that overrides `extraction.api_key`.
pub const API_KEY_ENV: &str = "DOCVERIFY_VLM_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub extraction: ExtractionConfig,
    pub upscale: UpscaleConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub forensics: ForensicsConfig,
    #[serde(default)]
    pub officers: Vec<OfficerConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_attempts: u32,      // Total attempts for malformed responses (default: 2)
    pub retry_delay_ms: u64,    // Fixed pause between attempts
    pub max_in_flight: usize,   // Concurrent calls admitted to the model
    pub queue_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpscaleConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
    pub max_in_flight: usize,
    pub queue_timeout_seconds: u64,
}

/// Confidence thresholds shared by the fraud detector and the
/// recommendation engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Mean confidence at or above which a clean extraction is approved.
    pub approve_confidence: f64,
    /// Mean confidence below which a MEDIUM signal is raised.
    pub low_confidence: f64,
    /// Mean confidence below which a HIGH signal is raised; also the
    /// per-field bar for the inconsistency rule.
    pub very_low_confidence: f64,
    /// A field at or above this counts as "read clearly" when looking for
    /// inconsistent extractions.
    pub consistent_confidence: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            approve_confidence: 0.8,
            low_confidence: 0.5,
            very_low_confidence: 0.3,
            consistent_confidence: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForensicsConfig {
    /// Turn model-reported forensic findings into fraud signals.
    pub enabled: bool,
}

impl Default for ForensicsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfficerConfig {
    pub id: String,
    pub token: String,
    pub email: String,
    pub full_name: String,
    pub department: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_role() -> Role {
    Role::Officer
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                bind_address: "127.0.0.1:8080".to_string(),
                max_upload_bytes: default_max_upload_bytes(),
            },
            storage: StorageConfig {
                database_path: "/var/lib/docverify/docverify.db".to_string(),
            },
            extraction: ExtractionConfig {
                endpoint: "https://openrouter.ai/api/v1/chat/completions".to_string(),
                model: "qwen/qwen2.5-vl-7b-instruct".to_string(),
                api_key: None,
                timeout_seconds: 60,
                max_tokens: 15000,
                temperature: 0.1,
                max_attempts: 2,
                retry_delay_ms: 250,
                max_in_flight: 4,
                queue_timeout_seconds: 30,
            },
            upscale: UpscaleConfig {
                endpoint: "http://127.0.0.1:8090/upscale".to_string(),
                timeout_seconds: 120,
                max_in_flight: 1,
                queue_timeout_seconds: 60,
            },
            thresholds: Thresholds::default(),
            forensics: ForensicsConfig::default(),
            officers: vec![OfficerConfig {
                id: "admin".to_string(),
                token: "change-me".to_string(),
                email: "admin@example.org".to_string(),
                full_name: "Administrator".to_string(),
                department: None,
                role: Role::Admin,
                active: true,
            }],
            logging: Some(LoggingConfig {
                level: "info".to_string(),
            }),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.extraction.api_key = Some(key);
            }
        }
    }

    /// Checks everything that would otherwise only fail at request time.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut problems = Vec::new();
        let t = &self.thresholds;

        for (name, value) in [
            ("approve_confidence", t.approve_confidence),
            ("low_confidence", t.low_confidence),
            ("very_low_confidence", t.very_low_confidence),
            ("consistent_confidence", t.consistent_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                problems.push(format!("thresholds.{name} must lie in [0, 1], got {value}"));
            }
        }
        if !(t.very_low_confidence <= t.low_confidence && t.low_confidence <= t.approve_confidence)
        {
            problems.push(
                "thresholds must satisfy very_low_confidence <= low_confidence <= approve_confidence"
                    .to_string(),
            );
        }
        // A field cannot be both clearly read and very low confidence.
        if t.consistent_confidence <= t.very_low_confidence {
            problems.push(
                "thresholds.consistent_confidence must be greater than very_low_confidence"
                    .to_string(),
            );
        }

        if self.extraction.max_attempts == 0 {
            problems.push("extraction.max_attempts must be at least 1".to_string());
        }
        if self.extraction.max_in_flight == 0 {
            problems.push("extraction.max_in_flight must be at least 1".to_string());
        }
        if self.upscale.max_in_flight == 0 {
            problems.push("upscale.max_in_flight must be at least 1".to_string());
        }
        for (name, endpoint) in [
            ("extraction.endpoint", &self.extraction.endpoint),
            ("upscale.endpoint", &self.upscale.endpoint),
        ] {
            match Url::parse(endpoint) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                Ok(url) => problems.push(format!(
                    "{name} must use http or https, got {}",
                    url.scheme()
                )),
                Err(e) => problems.push(format!("{name} is not a valid URL: {e}")),
            }
        }

        let mut ids = HashSet::new();
        let mut tokens = HashSet::new();
        for officer in &self.officers {
            if !ids.insert(officer.id.as_str()) {
                problems.push(format!("duplicate officer id: {}", officer.id));
            }
            if officer.token.trim().is_empty() {
                problems.push(format!("officer {} has an empty token", officer.id));
            } else if !tokens.insert(officer.token.as_str()) {
                problems.push(format!("officer {} reuses another officer's token", officer.id));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(problems.join("; "))
        }
    }
}
