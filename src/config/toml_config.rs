use crate::core::engine::DEFAULT_JOB_NAME;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{DeleteError, Result};
use crate::utils::validation::{
    validate_file_extension, validate_non_empty_string, validate_path, validate_positive_number,
    validate_range, Validate,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub mapreduce: MapReduceConfig,
    pub storage: StorageConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default = "default_job_name")]
    pub name: String,
    pub description: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name: default_job_name(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    pub lease_minutes: Option<i64>,
    pub max_lease_count: Option<usize>,
    pub decode_failure_delay_hours: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapReduceConfig {
    pub shard_count: Option<usize>,
    pub reduce_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub state_file: String,
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
    pub json_logs: Option<bool>,
}

fn default_job_name() -> String {
    DEFAULT_JOB_NAME.to_string()
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| DeleteError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${STATE_DIR})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| DeleteError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn lease_minutes(&self) -> i64 {
        self.queue.lease_minutes.unwrap_or(20)
    }

    pub fn decode_failure_delay_hours(&self) -> i64 {
        self.queue.decode_failure_delay_hours.unwrap_or(24)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.json_logs)
            .unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn job_name(&self) -> &str {
        &self.job.name
    }

    fn lease_duration(&self) -> Duration {
        Duration::minutes(self.lease_minutes())
    }

    fn max_lease_count(&self) -> usize {
        self.queue.max_lease_count.unwrap_or(1000)
    }

    fn decode_failure_delay(&self) -> Duration {
        Duration::hours(self.decode_failure_delay_hours())
    }

    fn shard_count(&self) -> usize {
        self.mapreduce.shard_count.unwrap_or(4)
    }

    fn reduce_concurrency(&self) -> usize {
        self.mapreduce.reduce_concurrency.unwrap_or(8)
    }

    fn state_file(&self) -> &str {
        &self.storage.state_file
    }

    fn output_path(&self) -> &str {
        &self.storage.output_path
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("job.name", &self.job.name)?;
        validate_path("storage.state_file", &self.storage.state_file)?;
        validate_file_extension("storage.state_file", &self.storage.state_file, &["json"])?;
        validate_path("storage.output_path", &self.storage.output_path)?;

        validate_range("queue.lease_minutes", self.lease_minutes(), 1, 24 * 60)?;
        validate_range(
            "queue.decode_failure_delay_hours",
            self.decode_failure_delay_hours(),
            1,
            24 * 7,
        )?;
        validate_positive_number("queue.max_lease_count", self.max_lease_count(), 1)?;
        validate_positive_number("mapreduce.shard_count", self.shard_count(), 1)?;
        validate_positive_number(
            "mapreduce.reduce_concurrency",
            self.reduce_concurrency(),
            1,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
[storage]
state_file = "registry.json"
output_path = "./output"
"#,
        )
        .unwrap();

        assert_eq!(config.job_name(), DEFAULT_JOB_NAME);
        assert_eq!(config.lease_duration(), Duration::minutes(20));
        assert_eq!(config.decode_failure_delay(), Duration::days(1));
        assert_eq!(config.max_lease_count(), 1000);
        assert_eq!(config.shard_count(), 4);
        assert!(!config.monitoring_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("ASYNC_DELETE_TEST_STATE_DIR", "/var/lib/registry");

        let config = TomlConfig::from_toml_str(
            r#"
[storage]
state_file = "${ASYNC_DELETE_TEST_STATE_DIR}/registry.json"
output_path = "${ASYNC_DELETE_TEST_UNSET_DIR}"
"#,
        )
        .unwrap();
        assert_eq!(config.storage.state_file, "/var/lib/registry/registry.json");
        assert_eq!(config.storage.output_path, "${ASYNC_DELETE_TEST_UNSET_DIR}");

        std::env::remove_var("ASYNC_DELETE_TEST_STATE_DIR");
    }

    #[test]
    fn test_config_validation() {
        let config = TomlConfig::from_toml_str(
            r#"
[queue]
lease_minutes = 0

[storage]
state_file = "registry.json"
output_path = "./output"
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue.lease_minutes"));

        let config = TomlConfig::from_toml_str(
            r#"
[storage]
state_file = "registry.yaml"
output_path = "./output"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(
                br#"
[job]
name = "nightly delete"

[mapreduce]
shard_count = 2
reduce_concurrency = 3

[storage]
state_file = "registry.json"
output_path = "./output"

[monitoring]
enabled = true
json_logs = true
"#,
            )
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.job_name(), "nightly delete");
        assert_eq!(config.shard_count(), 2);
        assert_eq!(config.reduce_concurrency(), 3);
        assert!(config.monitoring_enabled());
        assert!(config.json_logs());
    }

    #[test]
    fn test_missing_storage_section_fails() {
        assert!(TomlConfig::from_toml_str("[job]\nname = \"x\"\n").is_err());
    }
}
