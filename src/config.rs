//! Runtime configuration.
//!
//! Settings are layered: built-in defaults, then an optional
//! `payslip.toml` in the working directory, then environment variables
//! prefixed `PAYSLIP_` (e.g. `PAYSLIP_BIND_ADDR=0.0.0.0:8080`).

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Directory scanned for delivery type / driver seed files.
    pub seed_dir: PathBuf,
    /// Consumption tax rate contained in unit prices, in percent.
    pub tax_rate_percent: i64,
    /// Link to the driver app, appended to help replies when set.
    pub app_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            seed_dir: PathBuf::from("seed"),
            tax_rate_percent: crate::tax::STANDARD_RATE_PERCENT,
            app_url: None,
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("payslip")
    }

    /// Loads using `file_stem` (without extension) as the optional
    /// config file.
    pub fn load_from(file_stem: &str) -> Result<Self, ConfigError> {
        let defaults = EngineConfig::default();
        let config = Config::builder()
            .set_default("bind_addr", defaults.bind_addr)?
            .set_default("seed_dir", defaults.seed_dir.to_string_lossy().to_string())?
            .set_default("tax_rate_percent", defaults.tax_rate_percent)?
            .add_source(File::with_name(file_stem).required(false))
            .add_source(Environment::with_prefix("PAYSLIP"))
            .build()?;
        let loaded: EngineConfig = config.try_deserialize()?;
        if loaded.tax_rate_percent < 0 {
            return Err(ConfigError::Message(format!(
                "tax_rate_percent must not be negative, got {}",
                loaded.tax_rate_percent
            )));
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_file() {
        let config = EngineConfig::load_from("definitely-missing-payslip-config").unwrap();
        assert_eq!(config.tax_rate_percent, 10);
        assert_eq!(config.seed_dir, PathBuf::from("seed"));
        assert!(config.app_url.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = std::env::temp_dir().join(format!("payslip-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("custom.toml");
        std::fs::write(
            &path,
            "bind_addr = \"0.0.0.0:8080\"\ntax_rate_percent = 8\napp_url = \"https://example.com/app\"\n",
        )
        .unwrap();

        let stem = dir.join("custom");
        let config = EngineConfig::load_from(&stem.to_string_lossy()).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.tax_rate_percent, 8);
        assert_eq!(config.app_url.as_deref(), Some("https://example.com/app"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
