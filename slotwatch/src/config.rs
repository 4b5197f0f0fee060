//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The file path defaults to `config.yaml` but can be specified
//! via the `-f` flag or the `SLOTWATCH_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Sources are merged in order (later overrides earlier):
//!
//! 1. **YAML config file** - base configuration
//! 2. **Environment variables** - `SLOTWATCH_`-prefixed, `__` for nesting
//!    (e.g. `SLOTWATCH_SCANNER__MAX_CONCURRENT_FETCHES=5`)
//! 3. **DATABASE_URL** - special case: overrides `database.url` if set
//!
//! Missing credentials for an enabled notification channel are a fatal
//! configuration error at startup, never a per-cycle failure.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "SLOTWATCH_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the service.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP trigger-surface host to bind to
    pub host: String,
    /// HTTP trigger-surface port to bind to
    pub port: u16,
    /// Convenience override for `database.url`, normally set via the
    /// DATABASE_URL environment variable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub database: DatabaseConfig,
    /// Access key required in the X-Access-Key header for the manual scan
    /// trigger. Unset disables the trigger endpoint.
    pub scan_access_key: Option<String>,
    pub inventory: InventoryConfig,
    pub scanner: ScannerConfig,
    pub dispatch: DispatchConfig,
    pub email: EmailConfig,
    pub sms: SmsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: None,
            database: DatabaseConfig::default(),
            scan_access_key: None,
            inventory: InventoryConfig::default(),
            scanner: ScannerConfig::default(),
            dispatch: DispatchConfig::default(),
            email: EmailConfig::default(),
            sms: SmsConfig::default(),
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 2,
        }
    }
}

/// Inventory provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InventoryConfig {
    pub base_url: String,
    /// Per-request timeout for inventory fetches
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    /// Per-request timeout for booking attempts
    #[serde(with = "humantime_serde")]
    pub booking_timeout: Duration,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://loyaltyapi.wisely.io".to_string(),
            fetch_timeout: Duration::from_secs(10),
            booking_timeout: Duration::from_secs(15),
        }
    }
}

/// Scan scheduling and fan-out settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerConfig {
    /// Cadence for the urgent tier (target date within 24h)
    #[serde(with = "humantime_serde")]
    pub urgent_interval: Duration,
    /// Cadence for the normal tier
    #[serde(with = "humantime_serde")]
    pub normal_interval: Duration,
    /// Cadence for the expiry sweep
    #[serde(with = "humantime_serde")]
    pub expiry_interval: Duration,
    /// Cadence for ledger/session cleanup
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// How often the scheduler wakes to evaluate due jobs
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Hard ceiling on concurrent inventory fetches per cycle
    pub max_concurrent_fetches: usize,
    /// Pause between successive fetch batches, to respect provider limits
    #[serde(with = "humantime_serde")]
    pub batch_pacing: Duration,
    /// Normal-tier watches scanned more recently than this are skipped
    /// (buffer below the cadence, so a slightly early tick doesn't rescan)
    #[serde(with = "humantime_serde")]
    pub normal_rescan_buffer: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            urgent_interval: Duration::from_secs(10 * 60),
            normal_interval: Duration::from_secs(30 * 60),
            expiry_interval: Duration::from_secs(60 * 60),
            cleanup_interval: Duration::from_secs(6 * 60 * 60),
            tick_interval: Duration::from_secs(5),
            max_concurrent_fetches: 10,
            batch_pacing: Duration::from_secs(1),
            normal_rescan_buffer: Duration::from_secs(25 * 60),
        }
    }
}

/// Notification dispatch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Internal queue capacity between the scan executor and the dispatcher
    pub channel_capacity: usize,
    /// Maximum concurrent outbound sends/bookings
    pub max_concurrent_sends: usize,
    /// Attempts per action before recording a failure in the ledger
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,
    /// Ceiling on the retry delay
    #[serde(with = "humantime_serde")]
    pub backoff_cap: Duration,
    /// Failed ledger entries older than this are purged by the cleanup job
    #[serde(with = "humantime_serde")]
    pub failed_retention: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 200,
            max_concurrent_sends: 8,
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            failed_retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Email channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmailConfig {
    pub enabled: bool,
    pub from_email: String,
    pub from_name: String,
    /// Link included in "book now" notification bodies
    pub booking_url: String,
    pub transport: EmailTransportConfig,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            from_email: "notifications@slotwatch.local".to_string(),
            from_name: "Slotwatch".to_string(),
            booking_url: "https://www.gethoustons.bar".to_string(),
            transport: EmailTransportConfig::default(),
        }
    }
}

/// Email transport: real SMTP, or a file transport for development and
/// testing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum EmailTransportConfig {
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
        use_tls: bool,
    },
    File {
        path: String,
    },
}

impl Default for EmailTransportConfig {
    fn default() -> Self {
        EmailTransportConfig::File {
            path: "./emails".to_string(),
        }
    }
}

/// SMS channel configuration (Twilio-compatible REST API).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmsConfig {
    pub enabled: bool,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub base_url: String,
    /// Per-request timeout for sends
    #[serde(with = "humantime_serde")]
    pub send_timeout: Duration,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            base_url: "https://api.twilio.com".to_string(),
            send_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // DATABASE_URL convenience override
        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("SLOTWATCH_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database_url".into()))
    }

    /// Validate the configuration for consistency and required fields.
    /// ConfigurationError is fatal at startup.
    pub fn validate(&self) -> Result<(), Error> {
        if self.database.url.is_empty() {
            return Err(Error::Configuration {
                message: "database.url is not set (set DATABASE_URL or database.url in the config file)".to_string(),
            });
        }

        if self.email.enabled {
            if let EmailTransportConfig::Smtp { host, password, .. } = &self.email.transport {
                if host.is_empty() || password.is_empty() {
                    return Err(Error::Configuration {
                        message: "email is enabled with SMTP transport but host/password are not configured".to_string(),
                    });
                }
            }
            if self.email.from_email.is_empty() {
                return Err(Error::Configuration {
                    message: "email is enabled but from_email is not configured".to_string(),
                });
            }
        }

        if self.sms.enabled
            && (self.sms.account_sid.is_empty() || self.sms.auth_token.is_empty() || self.sms.from_number.is_empty())
        {
            return Err(Error::Configuration {
                message: "sms is enabled but account_sid/auth_token/from_number are not configured".to_string(),
            });
        }

        if self.scanner.max_concurrent_fetches == 0 {
            return Err(Error::Configuration {
                message: "scanner.max_concurrent_fetches must be at least 1".to_string(),
            });
        }

        if self.dispatch.max_attempts == 0 {
            return Err(Error::Configuration {
                message: "dispatch.max_attempts must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn test_args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn defaults_load_with_database_url_env() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "")?;
            jail.set_env("DATABASE_URL", "postgresql://localhost/slotwatch");

            let config = Config::load(&test_args("config.yaml")).expect("config should load");
            assert_eq!(config.database.url, "postgresql://localhost/slotwatch");
            assert_eq!(config.scanner.max_concurrent_fetches, 10);
            assert_eq!(config.scanner.urgent_interval, Duration::from_secs(600));
            assert_eq!(config.dispatch.max_attempts, 3);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_nested_values() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "port: 9000\n")?;
            jail.set_env("DATABASE_URL", "postgresql://localhost/slotwatch");
            jail.set_env("SLOTWATCH_SCANNER__MAX_CONCURRENT_FETCHES", "3");
            jail.set_env("SLOTWATCH_SCANNER__BATCH_PACING", "250ms");

            let config = Config::load(&test_args("config.yaml")).expect("config should load");
            assert_eq!(config.port, 9000);
            assert_eq!(config.scanner.max_concurrent_fetches, 3);
            assert_eq!(config.scanner.batch_pacing, Duration::from_millis(250));
            Ok(())
        });
    }

    #[test]
    fn missing_database_url_is_fatal() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "")?;
            assert!(Config::load(&test_args("config.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn enabled_sms_without_credentials_is_fatal() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
sms:
  enabled: true
"#,
            )?;
            jail.set_env("DATABASE_URL", "postgresql://localhost/slotwatch");
            assert!(Config::load(&test_args("config.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn enabled_smtp_without_password_is_fatal() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
email:
  enabled: true
  transport:
    type: smtp
    host: smtp.sendgrid.net
    port: 587
    username: apikey
    password: ""
    use_tls: true
"#,
            )?;
            jail.set_env("DATABASE_URL", "postgresql://localhost/slotwatch");
            assert!(Config::load(&test_args("config.yaml")).is_err());
            Ok(())
        });
    }
}
