use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;

use domain::services::{HoldPolicy, ProFeatureConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Session token validation
    pub jwt: JwtAuthConfig,
    /// Email service configuration
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    /// Pro feature gates keyed by feature name
    #[serde(default)]
    pub pro_features: HashMap<String, ProFeatureConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Registration hold TTLs and pricing.
///
/// TTLs are floats so fractional minutes work; invalid values fall back to
/// the built-in defaults in [`HoldPolicy`].
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationConfig {
    #[serde(default = "default_started_ttl")]
    pub started_ttl_minutes: f64,

    #[serde(default = "default_submitted_ttl")]
    pub submitted_ttl_minutes: f64,

    #[serde(default = "default_payment_pending_ttl")]
    pub payment_pending_ttl_hours: f64,

    /// Service fee in basis points of the list price (500 = 5%).
    #[serde(default = "default_fee_basis_points")]
    pub fee_basis_points: i32,

    /// Base URL used to build invite claim links.
    #[serde(default = "default_claim_base_url")]
    pub invite_claim_base_url: String,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            started_ttl_minutes: default_started_ttl(),
            submitted_ttl_minutes: default_submitted_ttl(),
            payment_pending_ttl_hours: default_payment_pending_ttl(),
            fee_basis_points: default_fee_basis_points(),
            invite_claim_base_url: default_claim_base_url(),
        }
    }
}

impl RegistrationConfig {
    pub fn hold_policy(&self) -> HoldPolicy {
        HoldPolicy::new(
            self.started_ttl_minutes,
            self.submitted_ttl_minutes,
            self.payment_pending_ttl_hours,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_trial_days")]
    pub trial_days: i64,

    #[serde(default = "default_pending_grant_days")]
    pub pending_grant_default_days: i32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            trial_days: default_trial_days(),
            pending_grant_default_days: default_pending_grant_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_batch_rows")]
    pub max_batch_rows: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_batch_rows: default_max_batch_rows(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_cleanup_enabled")]
    pub cleanup_enabled: bool,

    /// Unverified accounts older than this are purged.
    #[serde(default = "default_unverified_retention")]
    pub unverified_user_retention_hours: i64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            cleanup_enabled: default_cleanup_enabled(),
            unverified_user_retention_hours: default_unverified_retention(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_started_ttl() -> f64 {
    30.0
}
fn default_submitted_ttl() -> f64 {
    30.0
}
fn default_payment_pending_ttl() -> f64 {
    24.0
}
fn default_fee_basis_points() -> i32 {
    domain::services::pricing::DEFAULT_FEE_BASIS_POINTS
}
fn default_claim_base_url() -> String {
    "http://localhost:3000/invites/claim".to_string()
}
fn default_trial_days() -> i64 {
    14
}
fn default_pending_grant_days() -> i32 {
    30
}
fn default_max_batch_rows() -> usize {
    500
}
fn default_cleanup_enabled() -> bool {
    true
}
fn default_unverified_retention() -> i64 {
    72
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtAuthConfig {
    /// Shared HS256 secret used by the session service
    pub secret: String,

    /// Lifetime of development tokens issued by this service
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: i64,

    /// Leeway in seconds for clock skew tolerance (default: 30)
    #[serde(default = "default_jwt_leeway")]
    pub leeway_secs: u64,
}

fn default_access_token_expiry() -> i64 {
    3600 // 1 hour
}

fn default_jwt_leeway() -> u64 {
    30
}

/// Email delivery for participant notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Email provider: sendgrid, or console (for development)
    #[serde(default = "default_email_provider")]
    pub provider: String,

    #[serde(default)]
    pub sendgrid_api_key: String,

    #[serde(default = "default_sender_email")]
    pub sender_email: String,

    #[serde(default = "default_sender_name")]
    pub sender_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_email_provider(),
            sendgrid_api_key: String::new(),
            sender_email: default_sender_email(),
            sender_name: default_sender_name(),
        }
    }
}

fn default_email_provider() -> String {
    "console".to_string()
}

fn default_sender_email() -> String {
    "noreply@race-registration.local".to_string()
}

fn default_sender_name() -> String {
    "Race Registration".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with RR__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("RR").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Defaults are embedded so tests do not depend on the working directory.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""
            max_connections = 20
            min_connections = 5
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [jwt]
            secret = "test-secret-for-session-tokens"
            access_token_expiry_secs = 3600
            leeway_secs = 30

            [email]
            enabled = false
            provider = "console"
            sender_email = "test@example.com"
            sender_name = "Test"

            [jobs]
            cleanup_enabled = false
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        // Validation is skipped so tests can build partial configs.
        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "RR__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.jwt.secret.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "RR__JWT__SECRET environment variable must be set".to_string(),
            ));
        }

        if !(0..=10_000).contains(&self.registration.fee_basis_points) {
            return Err(ConfigValidationError::InvalidValue(
                "fee_basis_points must be between 0 and 10000".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }

    /// Gate settings for a Pro feature. Unknown features use the defaults.
    pub fn pro_feature(&self, key: &str) -> ProFeatureConfig {
        self.pro_features.get(key).cloned().unwrap_or_default()
    }
}
