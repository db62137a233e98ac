pub mod toml_config;

pub use toml_config::TomlConfig;

#[cfg(feature = "cli")]
pub use cli::CliConfig;

#[cfg(feature = "cli")]
mod cli {
    use crate::core::engine::DEFAULT_JOB_NAME;
    use crate::domain::ports::ConfigProvider;
    use crate::utils::error::Result;
    use crate::utils::validation::{
        validate_file_extension, validate_non_empty_string, validate_path,
        validate_positive_number, validate_range, Validate,
    };
    use chrono::Duration;
    use clap::Parser;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, Parser)]
    #[command(name = "async-delete")]
    #[command(about = "Runs one asynchronous deletion pass over pending contacts and hosts")]
    pub struct CliConfig {
        #[arg(long, default_value = "registry.json", help = "Registry snapshot to load and update")]
        pub state_file: String,

        #[arg(long, default_value = "./output")]
        pub output_path: String,

        #[arg(long, help = "TOML config file; overrides the flags below")]
        pub config: Option<String>,

        #[arg(long, default_value = DEFAULT_JOB_NAME)]
        pub job_name: String,

        #[arg(long, default_value = "20")]
        pub lease_minutes: i64,

        #[arg(long, default_value = "1000")]
        pub max_lease_count: usize,

        #[arg(long, default_value = "24")]
        pub decode_failure_delay_hours: i64,

        #[arg(long, default_value = "4")]
        pub shard_count: usize,

        #[arg(long, default_value = "8")]
        pub reduce_concurrency: usize,

        #[arg(long, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, help = "Log process CPU and memory per phase")]
        pub monitor: bool,

        #[arg(long, help = "Emit logs as JSON")]
        pub json_logs: bool,
    }

    impl ConfigProvider for CliConfig {
        fn job_name(&self) -> &str {
            &self.job_name
        }

        fn lease_duration(&self) -> Duration {
            Duration::minutes(self.lease_minutes)
        }

        fn max_lease_count(&self) -> usize {
            self.max_lease_count
        }

        fn decode_failure_delay(&self) -> Duration {
            Duration::hours(self.decode_failure_delay_hours)
        }

        fn shard_count(&self) -> usize {
            self.shard_count
        }

        fn reduce_concurrency(&self) -> usize {
            self.reduce_concurrency
        }

        fn state_file(&self) -> &str {
            &self.state_file
        }

        fn output_path(&self) -> &str {
            &self.output_path
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            validate_non_empty_string("job_name", &self.job_name)?;
            validate_path("state_file", &self.state_file)?;
            validate_file_extension("state_file", &self.state_file, &["json"])?;
            validate_path("output_path", &self.output_path)?;
            validate_range("lease_minutes", self.lease_minutes, 1, 24 * 60)?;
            validate_range(
                "decode_failure_delay_hours",
                self.decode_failure_delay_hours,
                1,
                24 * 7,
            )?;
            validate_positive_number("max_lease_count", self.max_lease_count, 1)?;
            validate_positive_number("shard_count", self.shard_count, 1)?;
            validate_positive_number("reduce_concurrency", self.reduce_concurrency, 1)?;
            Ok(())
        }
    }

}
