use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

use crate::calendar::TimeRule;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EntsoeConfig {
    #[serde(default = "default_entsoe_base_url")]
    pub base_url: String,
    pub token: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExchangeRatesConfig {
    #[serde(default = "default_exchangerates_base_url")]
    pub base_url: String,
    pub token: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SvgConfig {
    pub output_dir: PathBuf,
    pub template_file: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub entsoe: EntsoeConfig,
    pub exchangerates: ExchangeRatesConfig,
    pub mqtt: MqttConfig,
    pub svg: SvgConfig,
    /// Symbol the EUR prices are converted into.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// IANA timezone name. The built-in fixed CET rule applies when unset.
    #[serde(default)]
    pub timezone: Option<String>,
}

fn default_entsoe_base_url() -> String {
    "https://web-api.tp.entsoe.eu".to_string()
}

fn default_exchangerates_base_url() -> String {
    "http://api.exchangeratesapi.io".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "elspot".to_string()
}

fn default_currency() -> String {
    "NOK".to_string()
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("no", "elspot", "elspot")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn time_rule(&self) -> Result<TimeRule> {
        match &self.timezone {
            None => Ok(TimeRule::FixedCet),
            Some(name) => name
                .parse::<chrono_tz::Tz>()
                .map(TimeRule::Named)
                .map_err(|err| anyhow!("Invalid timezone {name}: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
entsoe:
  token: "entsoe-token"
exchangerates:
  token: "rates-token"
mqtt:
  host: "broker.local"
  username: "elspot"
  password: "hunter2"
svg:
  output_dir: "/var/www/elspot"
  template_file: "/etc/elspot/template.svg"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.entsoe.token, "entsoe-token");
        assert_eq!(config.entsoe.base_url, "https://web-api.tp.entsoe.eu");
        assert_eq!(config.exchangerates.token, "rates-token");
        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.client_id, "elspot");
        assert_eq!(config.mqtt.username.as_deref(), Some("elspot"));
        assert_eq!(config.currency, "NOK");
        assert!(config.timezone.is_none());
        assert!(matches!(config.time_rule().unwrap(), TimeRule::FixedCet));

        let yaml_with_timezone = r#"
entsoe:
  base_url: "http://example.com/entsoe"
  token: "t"
exchangerates:
  base_url: "http://example.com/rates"
  token: "t"
mqtt:
  host: "localhost"
svg:
  output_dir: "/tmp/svg"
  template_file: "/tmp/template.svg"
currency: "SEK"
timezone: "Europe/Oslo"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_with_timezone).unwrap();
        assert_eq!(config.entsoe.base_url, "http://example.com/entsoe");
        assert_eq!(config.currency, "SEK");
        assert!(matches!(config.time_rule().unwrap(), TimeRule::Named(_)));
    }

    #[test]
    fn test_default_config_path() {
        let path = AppConfig::default_config_path().unwrap();
        assert!(path.ends_with("config.yaml"));
        assert!(path.to_string_lossy().contains("elspot"));
    }

    #[test]
    fn test_invalid_timezone_is_rejected() {
        let config = AppConfig {
            entsoe: EntsoeConfig {
                base_url: default_entsoe_base_url(),
                token: "t".into(),
            },
            exchangerates: ExchangeRatesConfig {
                base_url: default_exchangerates_base_url(),
                token: "t".into(),
            },
            mqtt: MqttConfig {
                host: "localhost".into(),
                port: default_mqtt_port(),
                client_id: default_mqtt_client_id(),
                username: None,
                password: None,
            },
            svg: SvgConfig {
                output_dir: "/tmp".into(),
                template_file: "/tmp/template.svg".into(),
            },
            currency: default_currency(),
            timezone: Some("Europe/Atlantis".into()),
        };
        assert!(config.time_rule().is_err());
    }
}
