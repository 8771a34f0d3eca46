use chrono::{FixedOffset, Offset, Utc};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tenderwatch_types::{CompanyProfile, SignatureFormat};

/// Signing service configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SigningConfig {
    /// Base URL of the signing service
    #[serde(default = "default_signing_url")]
    pub url: String,
    #[serde(default = "default_signing_timeout")]
    pub timeout_secs: u64,
    /// Encoding requested for application signatures
    #[serde(default)]
    pub format: SignatureFormat,
    /// Ask the service to verify each CMS signature before it is persisted
    #[serde(default)]
    pub verify_after_sign: bool,
}

fn default_signing_url() -> String {
    "http://localhost:14579".to_string()
}

fn default_signing_timeout() -> u64 {
    30
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            url: default_signing_url(),
            timeout_secs: default_signing_timeout(),
            format: SignatureFormat::default(),
            verify_after_sign: false,
        }
    }
}

/// Page driver (collector sidecar) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Base URL of the page driver sidecar
    #[serde(default = "default_collector_url")]
    pub url: String,
    #[serde(default = "default_collector_timeout")]
    pub timeout_secs: u64,
    /// Category filter forwarded to the page driver
    #[serde(default = "default_category")]
    pub category: String,
    /// Maximum number of listing pages to scan per cycle
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Public procurement portal the page driver navigates
    #[serde(default = "default_portal_url")]
    pub portal_url: String,
}

fn default_collector_url() -> String {
    "http://localhost:14580".to_string()
}

fn default_collector_timeout() -> u64 {
    60
}

fn default_category() -> String {
    "силовые структуры".to_string()
}

fn default_max_pages() -> u32 {
    3
}

fn default_portal_url() -> String {
    "https://goszakup.gov.kz".to_string()
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            url: default_collector_url(),
            timeout_secs: default_collector_timeout(),
            category: default_category(),
            max_pages: default_max_pages(),
            portal_url: default_portal_url(),
        }
    }
}

/// Poll loop timing
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Fixed pause between cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Fixed pause after a failed cycle
    #[serde(default = "default_error_cooldown")]
    pub error_cooldown_secs: u64,
    /// UTC offset of the wall-clock deadlines shown by the portal
    #[serde(default = "default_deadline_offset")]
    pub deadline_utc_offset_hours: i32,
}

fn default_poll_interval() -> u64 {
    300
}

fn default_error_cooldown() -> u64 {
    60
}

fn default_deadline_offset() -> i32 {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            error_cooldown_secs: default_error_cooldown(),
            deadline_utc_offset_hours: default_deadline_offset(),
        }
    }
}

impl SchedulerConfig {
    /// Offset used to interpret deadline text. Out-of-range values fall back to UTC.
    pub fn deadline_offset(&self) -> FixedOffset {
        self.deadline_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Filesystem locations
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root key and encrypted secrets
    #[serde(default = "default_keys_dir")]
    pub keys_dir: PathBuf,
    /// Signed applications and the processed-identifier list
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_keys_dir() -> PathBuf {
    PathBuf::from("./keys")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            keys_dir: default_keys_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl StorageConfig {
    pub fn processed_file(&self) -> PathBuf {
        self.output_dir.join("processed.json")
    }
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Applicant details (required)
    pub company: CompanyProfile,
}

impl AppConfig {
    /// Load configuration from `config/` and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new("config"))
    }

    /// Load configuration from `<dir>/default`, `<dir>/local` and the environment
    pub fn load_from(dir: &Path) -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default config file
            .add_source(File::from(dir.join("default")).required(false))
            // Override with local config if present
            .add_source(File::from(dir.join("local")).required(false))
            // Override with environment variables (prefix: TENDERWATCH_)
            // e.g., TENDERWATCH_SIGNING__URL, TENDERWATCH_SCHEDULER__POLL_INTERVAL_SECS
            .add_source(
                Environment::with_prefix("TENDERWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

/// Helper to join a sidecar path onto a base URL with proper slash handling
pub fn endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}
