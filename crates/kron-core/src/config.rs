use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::app_config::AppConfig;
use crate::labels;
use crate::ConfigError;

/// Upper bound for `KRON_GC_AGE_HOURS` (roughly a century).
const MAX_GC_AGE_HOURS: f64 = 1_000_000.0;

/// Optional YAML configuration file. Every key is optional and maps onto
/// the `KRON_*` variable of the same name.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub namespace: Option<String>,
    pub host: Option<String>,
    pub log_level: Option<String>,
    pub gc_enabled: Option<bool>,
    pub gc_interval_minutes: Option<u64>,
    pub gc_age_hours: Option<f64>,
    pub template_selector: Option<String>,
    pub watch_retry_max: Option<u32>,
    pub watch_retry_backoff_ms: Option<u64>,
    pub drain_timeout_secs: Option<u64>,
}

impl ConfigFile {
    /// Flattens the file into `KRON_*` keys so it can sit underneath the
    /// environment in the lookup chain.
    #[must_use]
    pub fn to_vars(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                vars.insert(key.to_string(), v);
            }
        };
        put("KRON_NAMESPACE", self.namespace.clone());
        put("KRON_HOST", self.host.clone());
        put("KRON_LOG_LEVEL", self.log_level.clone());
        put("KRON_GC_ENABLED", self.gc_enabled.map(|v| v.to_string()));
        put(
            "KRON_GC_INTERVAL_MINUTES",
            self.gc_interval_minutes.map(|v| v.to_string()),
        );
        put("KRON_GC_AGE_HOURS", self.gc_age_hours.map(|v| v.to_string()));
        put("KRON_TEMPLATE_SELECTOR", self.template_selector.clone());
        put(
            "KRON_WATCH_RETRY_MAX",
            self.watch_retry_max.map(|v| v.to_string()),
        );
        put(
            "KRON_WATCH_RETRY_BACKOFF_MS",
            self.watch_retry_backoff_ms.map(|v| v.to_string()),
        );
        put(
            "KRON_DRAIN_TIMEOUT_SECS",
            self.drain_timeout_secs.map(|v| v.to_string()),
        );
        vars
    }
}

/// Read and parse a YAML configuration file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::File`] if it is not valid YAML for [`ConfigFile`].
pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_yaml::from_str(&content).map_err(|e| ConfigError::File {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load application configuration.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files, then resolves every
/// key from `overrides` (command-line flags), the process environment, and
/// the optional config file, in that order, before falling back to defaults.
///
/// # Errors
///
/// Returns `ConfigError` if the config file cannot be loaded or a value is
/// invalid.
pub fn load_app_config(
    config_file: Option<&Path>,
    overrides: &HashMap<String, String>,
) -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    let file_vars = match config_file {
        Some(path) => load_config_file(path)?.to_vars(),
        None => HashMap::new(),
    };

    build_app_config(|key| {
        if let Some(v) = overrides.get(key) {
            return Ok(v.clone());
        }
        std::env::var(key).or_else(|err| file_vars.get(key).cloned().ok_or(err))
    })
}

/// Build application configuration using the provided lookup function.
///
/// The parsing/validation logic is decoupled from the actual environment so
/// it can be tested with a pure `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let namespace = or_default("KRON_NAMESPACE", "default");
    if namespace.trim().is_empty() {
        return Err(invalid("KRON_NAMESPACE", "must be non-empty".to_string()));
    }

    let host = lookup("KRON_HOST").ok().filter(|h| !h.trim().is_empty());
    let log_level = or_default("KRON_LOG_LEVEL", "info");
    let gc_enabled = parse_bool("KRON_GC_ENABLED", &or_default("KRON_GC_ENABLED", "true"))?;

    let gc_interval_minutes = parse_u64("KRON_GC_INTERVAL_MINUTES", "1")?;
    if gc_interval_minutes == 0 {
        return Err(invalid(
            "KRON_GC_INTERVAL_MINUTES",
            "must be greater than zero".to_string(),
        ));
    }

    let gc_age_hours = or_default("KRON_GC_AGE_HOURS", "0.1")
        .parse::<f64>()
        .map_err(|e| invalid("KRON_GC_AGE_HOURS", e.to_string()))?;
    if !gc_age_hours.is_finite() || !(0.0..=MAX_GC_AGE_HOURS).contains(&gc_age_hours) {
        return Err(invalid(
            "KRON_GC_AGE_HOURS",
            format!("must be between 0 and {MAX_GC_AGE_HOURS}"),
        ));
    }

    let template_selector = or_default("KRON_TEMPLATE_SELECTOR", &labels::template_selector());
    let watch_retry_max = parse_u32("KRON_WATCH_RETRY_MAX", "5")?;
    let watch_retry_backoff_ms = parse_u64("KRON_WATCH_RETRY_BACKOFF_MS", "1000")?;
    let drain_timeout_secs = parse_u64("KRON_DRAIN_TIMEOUT_SECS", "30")?;

    Ok(AppConfig {
        namespace,
        host,
        log_level,
        gc_enabled,
        gc_interval_minutes,
        gc_age_hours,
        template_selector,
        watch_retry_max,
        watch_retry_backoff_ms,
        drain_timeout_secs,
    })
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
