use crate::adapters::warehouse::DEFAULT_ENDPOINT;
use crate::core::loader::PollSettings;
use crate::core::normalizer::ExcessPrecisionPolicy;
use crate::core::orchestrator::{OrchestratorSettings, DEFAULT_DATASET, DEFAULT_PREVIEW_ROWS};
use crate::core::staging::DEFAULT_STAGING_PREFIX;
use crate::domain::model::FieldWhitelists;
use crate::utils::error::{ReconError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub storage: StorageConfig,
    pub warehouse: WarehouseConfig,
    pub validation: ValidationConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    pub bucket: String,
    /// 本機後端的根目錄，對應整個 bucket
    pub root: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub staging_prefix: Option<String>,
    pub uri_scheme: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_warehouse_endpoint")]
    pub endpoint: String,
    pub project: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    pub access_token: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub max_poll_interval_ms: Option<u64>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub providers: Vec<String>,
    pub countries: Vec<String>,
    #[serde(default)]
    pub excess_precision: ExcessPrecisionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_preview_rows")]
    pub rows: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

fn default_warehouse_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_dataset() -> String {
    DEFAULT_DATASET.to_string()
}

fn default_preview_rows() -> usize {
    DEFAULT_PREVIEW_ROWS
}

fn is_unresolved(value: &str) -> bool {
    value.contains("${")
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ReconError::Config {
            message: format!("Cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ReconError::Config {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${WAREHOUSE_TOKEN})；未設定的保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ReconError::Config {
            message: format!("Invalid placeholder pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn staging_prefix(&self) -> &str {
        self.storage
            .staging_prefix
            .as_deref()
            .unwrap_or(DEFAULT_STAGING_PREFIX)
    }

    /// An access token whose placeholder was never resolved counts as absent.
    pub fn access_token(&self) -> Option<&str> {
        self.warehouse
            .access_token
            .as_deref()
            .filter(|token| !token.is_empty() && !is_unresolved(token))
    }

    pub fn whitelists(&self) -> FieldWhitelists {
        FieldWhitelists::new(
            self.validation.providers.iter().map(String::as_str),
            self.validation.countries.iter().map(String::as_str),
        )
    }

    pub fn poll_settings(&self) -> PollSettings {
        let defaults = PollSettings::default();
        PollSettings {
            initial_interval: self
                .warehouse
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_interval),
            max_interval: self
                .warehouse
                .max_poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_interval),
            timeout: self.warehouse.timeout_seconds.map(Duration::from_secs),
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            whitelists: self.whitelists(),
            excess_precision: self.validation.excess_precision,
            preview_rows: self.preview.rows,
            project: None,
            dataset: self.warehouse.dataset.clone(),
        }
    }

    fn validate_config(&self) -> Result<()> {
        validation::validate_bucket_name("storage.bucket", &self.storage.bucket)?;

        match self.storage.backend {
            StorageBackend::Local => {
                let root = validation::validate_required_field("storage.root", &self.storage.root)?;
                validation::validate_path("storage.root", root)?;
            }
            StorageBackend::S3 => {
                if let Some(region) = &self.storage.region {
                    validation::validate_region("storage.region", region)?;
                }
                if let Some(endpoint) = &self.storage.endpoint {
                    validation::validate_url("storage.endpoint", endpoint)?;
                }
            }
        }

        if let Some(prefix) = &self.storage.staging_prefix {
            validation::validate_non_empty_string("storage.staging_prefix", prefix)?;
            if prefix.starts_with('/') || prefix.split('/').any(|part| part == "..") {
                return Err(ReconError::InvalidConfigValue {
                    field: "storage.staging_prefix".to_string(),
                    value: prefix.clone(),
                    reason: "Prefix must be relative to the bucket".to_string(),
                });
            }
        }

        validation::validate_url("warehouse.endpoint", &self.warehouse.endpoint)?;
        if is_unresolved(&self.warehouse.project) {
            return Err(ReconError::MissingConfig {
                field: "warehouse.project".to_string(),
            });
        }
        validation::validate_non_empty_string("warehouse.project", &self.warehouse.project)?;
        validation::validate_non_empty_string("warehouse.dataset", &self.warehouse.dataset)?;

        let poll = self.poll_settings();
        validation::validate_positive_number(
            "warehouse.poll_interval_ms",
            poll.initial_interval.as_millis() as u64,
            1,
        )?;
        if poll.max_interval < poll.initial_interval {
            return Err(ReconError::InvalidConfigValue {
                field: "warehouse.max_poll_interval_ms".to_string(),
                value: poll.max_interval.as_millis().to_string(),
                reason: "Must not be shorter than warehouse.poll_interval_ms".to_string(),
            });
        }
        if let Some(timeout) = self.warehouse.timeout_seconds {
            validation::validate_positive_number("warehouse.timeout_seconds", timeout, 1)?;
        }

        if self.validation.providers.is_empty() {
            return Err(ReconError::MissingConfig {
                field: "validation.providers".to_string(),
            });
        }
        for provider in &self.validation.providers {
            validation::validate_non_empty_string("validation.providers", provider)?;
        }
        if self.validation.countries.is_empty() {
            return Err(ReconError::MissingConfig {
                field: "validation.countries".to_string(),
            });
        }
        validation::validate_country_codes("validation.countries", &self.validation.countries)?;

        validation::validate_range("preview.rows", self.preview.rows, 1, 100)?;

        Ok(())
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()?;
        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }
}
