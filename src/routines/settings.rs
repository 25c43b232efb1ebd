#![allow(dead_code)]

use config::Config as eConfig;
use serde::Deserialize;
use serde_derive::Serialize;

/// Settings for a fit
///
/// Read from a TOML configuration file with [read_settings], or constructed
/// directly. All fields have defaults suitable for daily case-count data.
#[derive(Debug, Deserialize, Clone, Serialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub fit: Fit,
    #[serde(default)]
    pub log: Log,
}

/// Solver and integrator controls
#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct Fit {
    /// Stop when the parameter step falls below this tolerance
    #[serde(default = "default_tol")]
    pub tol_params: f64,
    /// Stop when the relative residual improvement falls below this tolerance
    #[serde(default = "default_tol")]
    pub tol_residual: f64,
    /// Integration step size in days
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Cap on solver iterations
    #[serde(default = "default_max_iters")]
    pub max_iters: usize,
}

impl Default for Fit {
    fn default() -> Self {
        Fit {
            tol_params: default_tol(),
            tol_residual: default_tol(),
            dt: default_dt(),
            max_iters: default_max_iters(),
        }
    }
}

/// Logging controls, see [crate::logger::setup_log]
#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file; created (truncated) if set
    pub file: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Read settings from a TOML file, with an `EPICORE`-prefixed environment
/// variable overlay
pub fn read_settings(path: impl Into<String>) -> Result<Settings, config::ConfigError> {
    let settings_path = path.into();

    let parsed = eConfig::builder()
        .add_source(config::File::with_name(&settings_path).format(config::FileFormat::Toml))
        .add_source(config::Environment::with_prefix("EPICORE").separator("_"))
        .build()?;

    parsed.try_deserialize()
}

// *********************************
// Default values for deserializing
// *********************************
fn default_tol() -> f64 {
    1e-8
}

fn default_dt() -> f64 {
    0.1
}

fn default_max_iters() -> usize {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}
