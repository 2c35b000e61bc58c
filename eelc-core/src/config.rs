use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::export::ExportSettings;
use crate::scheduler::ScheduleConfig;

/// Service account identity and destination bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcsSection {
    pub service_account: String,
    /// Path to the service account JSON key file.
    pub private_key: PathBuf,
    pub bucket_name: String,
    /// Earth Engine cloud project; defaults to the key file's project.
    #[serde(default)]
    pub project: Option<String>,
}

/// Schedule section as written in the config file. The dry-run limit only
/// applies when the CLI's test flag is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    pub batch_size: usize,
    pub max_running: usize,
    pub dry_run_limit: usize,
    pub poll_interval_secs: f64,
    pub stop_after: Option<usize>,
    pub max_status_errors: usize,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_running: 2000,
            dry_run_limit: 20,
            poll_interval_secs: 5.0,
            stop_after: None,
            max_status_errors: 5,
        }
    }
}

impl ScheduleSection {
    /// Values rejected by [`Config::validate`] fall back to the default.
    fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(Self::default().poll_interval_secs))
    }

    pub fn to_schedule(&self, dry_run: bool) -> ScheduleConfig {
        ScheduleConfig {
            batch_size: self.batch_size,
            max_running: self.max_running,
            poll_interval: self.poll_interval(),
            dry_run: dry_run.then_some(self.dry_run_limit),
            stop_after: self.stop_after,
            max_status_errors: self.max_status_errors,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("dat")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gcs: GcsSection,
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Config {
    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("gcs.service_account", self.gcs.service_account.is_empty()),
            ("gcs.bucket_name", self.gcs.bucket_name.is_empty()),
            ("gcs.private_key", self.gcs.private_key.as_os_str().is_empty()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, empty)| *empty) {
            return Err(ConfigError::MissingField(*field));
        }
        if self.schedule.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "schedule.batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.schedule.max_status_errors == 0 {
            return Err(ConfigError::Invalid {
                field: "schedule.max_status_errors",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.schedule.max_running == 0 {
            return Err(ConfigError::Invalid {
                field: "schedule.max_running",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Err(e) = Duration::try_from_secs_f64(self.schedule.poll_interval_secs) {
            return Err(ConfigError::Invalid {
                field: "schedule.poll_interval_secs",
                reason: format!("must be a non-negative number of seconds ({e})"),
            });
        }
        if self.export.width == 0 || self.export.height == 0 {
            return Err(ConfigError::Invalid {
                field: "export.width/height",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            bucket = %self.gcs.bucket_name,
            service_account = %self.gcs.service_account,
            cache_dir = %self.cache_dir.display(),
            batch_size = self.schedule.batch_size,
            max_running = self.schedule.max_running,
            "Loaded Config"
        );
        debug!(export = ?self.export, "Config loaded (export settings)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            gcs: GcsSection {
                service_account: "sa@p.iam.gserviceaccount.com".into(),
                private_key: "key.json".into(),
                bucket_name: "chips".into(),
                project: None,
            },
            export: ExportSettings::default(),
            schedule: ScheduleSection::default(),
            cache_dir: default_cache_dir(),
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn empty_bucket_is_missing_field() {
        let mut c = config();
        c.gcs.bucket_name.clear();
        assert!(matches!(
            c.validate(),
            Err(ConfigError::MissingField("gcs.bucket_name"))
        ));
    }

    #[test]
    fn zero_batch_is_invalid() {
        let mut c = config();
        c.schedule.batch_size = 0;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Invalid { field: "schedule.batch_size", .. })
        ));
    }

    #[test]
    fn out_of_range_poll_interval_is_invalid() {
        for secs in [1e20, -1.0, f64::NAN] {
            let mut c = config();
            c.schedule.poll_interval_secs = secs;
            assert!(
                matches!(
                    c.validate(),
                    Err(ConfigError::Invalid { field: "schedule.poll_interval_secs", .. })
                ),
                "{secs}"
            );
            assert_eq!(c.schedule.to_schedule(false).poll_interval, Duration::from_secs(5));
        }
    }

    #[test]
    fn dry_run_limit_only_applies_in_test_mode() {
        let section = ScheduleSection::default();
        assert_eq!(section.to_schedule(false).dry_run, None);
        assert_eq!(section.to_schedule(true).dry_run, Some(20));
        assert_eq!(section.to_schedule(true).poll_interval, Duration::from_secs(5));
    }
}
