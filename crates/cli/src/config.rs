use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use mvdose_core::{OpenFailurePolicy, QaThresholds, ReconstructOptions};
use serde::Deserialize;

pub const DEFAULT_CONFIG: &str = "mvdose.toml";

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub reconstruct: ReconstructSection,
    #[serde(default)]
    pub qa: QaThresholds,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconstructSection {
    #[serde(default)]
    pub skip_unreadable: bool,
}

impl AppConfig {
    /// Flags given on the command line win over the file.
    pub fn reconstruct_options(&self, skip_unreadable: bool) -> ReconstructOptions {
        let skip = skip_unreadable || self.reconstruct.skip_unreadable;
        ReconstructOptions {
            open_failure: if skip {
                OpenFailurePolicy::Skip
            } else {
                OpenFailurePolicy::Abort
            },
        }
    }
}

/// Loads `explicit`, or the default file when present.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = match explicit {
        Some(path) if !path.exists() => bail!("config file {} does not exist", path.display()),
        Some(path) => path.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG);
            if !default.exists() {
                return Ok(AppConfig::default());
            }
            default
        }
    };
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&contents)
}

fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| anyhow!("invalid config: {e}"))?;
    if config.qa.percent_limit.is_nan() || config.qa.percent_limit <= 0.0 {
        bail!("qa.percent_limit must be positive");
    }
    Ok(config)
}
