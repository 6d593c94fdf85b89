use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RESEND_BASE_URL: &str = "https://api.resend.com";
pub const DEFAULT_SCHEDULE_TIME: &str = "09:00";

/// Top-level config (drip.toml + DRIP_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DripConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mailer: MailerConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub campaigns: CampaignsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MailerProvider {
    /// Resend HTTP API.
    Resend,
    /// Log the rendered email instead of delivering it.
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailerConfig {
    #[serde(default = "default_provider")]
    pub provider: MailerProvider,
    /// Required when `provider = "resend"`. Override with DRIP_MAILER__API_KEY.
    pub api_key: Option<String>,
    #[serde(default = "default_from")]
    pub from: String,
    pub reply_to: Option<String>,
    #[serde(default = "default_resend_base_url")]
    pub base_url: String,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            from: default_from(),
            reply_to: None,
            base_url: default_resend_base_url(),
        }
    }
}

/// Knobs for the per-run fan-out across owners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Owners processed in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Hard ceiling on one owner's processing, delivery included.
    #[serde(default = "default_owner_timeout_secs")]
    pub owner_timeout_secs: u64,
    /// Ceiling on a single provider call.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Throttle between sends on one worker, drawn uniformly from [min, max].
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Reservations older than this are treated as left behind by a crashed run.
    #[serde(default = "default_stale_reservation_mins")]
    pub stale_reservation_mins: i64,
    #[serde(default = "bool_true")]
    pub business_days_only: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            owner_timeout_secs: default_owner_timeout_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            stale_reservation_mins: default_stale_reservation_mins(),
            business_days_only: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Daily run time, "HH:MM" UTC.
    #[serde(default = "default_schedule_time")]
    pub time: String,
    /// Also run on Saturday and Sunday.
    #[serde(default)]
    pub weekends: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            time: default_schedule_time(),
            weekends: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignsConfig {
    /// An installed owner with no PR activity for this long is dormant.
    #[serde(default = "default_dormant_after_days")]
    pub dormant_after_days: i64,
    /// Minimum gap between two salvage emails to the same owner.
    #[serde(default = "default_salvage_spacing_days")]
    pub salvage_spacing_days: i64,
}

impl Default for CampaignsConfig {
    fn default() -> Self {
        Self {
            dormant_after_days: default_dormant_after_days(),
            salvage_spacing_days: default_salvage_spacing_days(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_provider() -> MailerProvider {
    MailerProvider::Log
}
fn default_from() -> String {
    "GitAuto <info@gitauto.ai>".to_string()
}
fn default_resend_base_url() -> String {
    DEFAULT_RESEND_BASE_URL.to_string()
}
fn default_concurrency() -> usize {
    4
}
fn default_owner_timeout_secs() -> u64 {
    60
}
fn default_send_timeout_secs() -> u64 {
    15
}
fn default_min_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    1500
}
fn default_stale_reservation_mins() -> i64 {
    60
}
fn default_schedule_time() -> String {
    DEFAULT_SCHEDULE_TIME.to_string()
}
fn default_dormant_after_days() -> i64 {
    30
}
fn default_salvage_spacing_days() -> i64 {
    7
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.drip/drip.db", home)
}

impl DripConfig {
    /// Load config from a TOML file with DRIP_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. DRIP_CONFIG env var
    ///   3. ~/.drip/drip.toml
    ///
    /// A missing file is not an error: every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("DRIP_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::DripError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(DripConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DRIP_").split("__"))
    }

    /// Reject configs that would load but cannot run.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::DripError;

        if self.driver.concurrency == 0 {
            return Err(DripError::Config("driver.concurrency must be at least 1".into()));
        }
        // A sweep must never reach a reservation whose owner is still running.
        let stale_secs = self.driver.stale_reservation_mins.saturating_mul(60);
        if stale_secs <= 0 || (stale_secs as u64) <= self.driver.owner_timeout_secs {
            return Err(DripError::Config(format!(
                "driver.stale_reservation_mins ({}) must exceed driver.owner_timeout_secs ({}s)",
                self.driver.stale_reservation_mins, self.driver.owner_timeout_secs
            )));
        }
        if self.mailer.provider == MailerProvider::Resend
            && self.mailer.api_key.as_deref().map_or(true, str::is_empty)
        {
            return Err(DripError::Config(
                "mailer.api_key is required when mailer.provider = \"resend\"".into(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.drip/drip.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DripConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mailer.provider, MailerProvider::Log);
        assert_eq!(config.schedule.time, "09:00");
        assert!(!config.schedule.weekends);
        assert!(config.driver.business_days_only);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = DripConfig::load(Some("/nonexistent/drip.toml")).unwrap();
        assert_eq!(config.driver.concurrency, 4);
        assert_eq!(config.campaigns.salvage_spacing_days, 7);
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let toml = r#"
            [driver]
            concurrency = 8

            [schedule]
            time = "14:15"
            weekends = true

            [mailer]
            provider = "resend"
            api_key = "re_test"
        "#;
        let config: DripConfig = Figment::from(Serialized::defaults(DripConfig::default()))
            .merge(Toml::string(toml))
            .extract()
            .unwrap();
        assert_eq!(config.driver.concurrency, 8);
        assert_eq!(config.driver.send_timeout_secs, 15);
        assert_eq!(config.schedule.time, "14:15");
        assert!(config.schedule.weekends);
        assert_eq!(config.mailer.provider, MailerProvider::Resend);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn resend_without_key_is_rejected() {
        let mut config = DripConfig::default();
        config.mailer.provider = MailerProvider::Resend;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn stale_window_must_outlast_owner_timeout() {
        let mut config = DripConfig::default();
        for mins in [0, -5] {
            config.driver.stale_reservation_mins = mins;
            assert!(config.validate().is_err(), "stale_reservation_mins = {mins}");
        }

        config.driver.stale_reservation_mins = 2;
        config.driver.owner_timeout_secs = 120;
        assert!(config.validate().is_err());
        config.driver.owner_timeout_secs = 119;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = DripConfig::default();
        config.driver.concurrency = 0;
        assert!(config.validate().is_err());
    }
}
