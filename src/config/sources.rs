// src/config/sources.rs
//! Which upstream endpoints to poll. TOML file, with built-in defaults for the
//! two public APIs.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::providers::soap_session::{SoapSensor, DEFAULT_NAMESPACE};
use crate::ingest::providers::{site_sensor, timeseries};

pub const ENV_SOURCES_PATH: &str = "INGEST_SOURCES_PATH";
pub const DEFAULT_SOURCES_PATH: &str = "config/sources.toml";

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimeseriesSources {
    pub enabled: bool,
    pub base_url: String,
    pub endpoints: Vec<String>,
}

impl Default for TimeseriesSources {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: timeseries::DEFAULT_BASE_URL.to_string(),
            endpoints: timeseries::DEFAULT_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SiteSensorSources {
    pub enabled: bool,
    pub base_url: String,
    pub variable: String,
    pub last_n_days: u32,
    pub sensors: Vec<String>,
}

impl Default for SiteSensorSources {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: site_sensor::DEFAULT_BASE_URL.to_string(),
            variable: site_sensor::DEFAULT_VARIABLE.to_string(),
            last_n_days: site_sensor::DEFAULT_WINDOW_DAYS,
            sensors: site_sensor::DEFAULT_SENSORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SoapSensorEntry {
    pub id: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub units: String,
}

impl SoapSensorEntry {
    pub fn to_sensor(&self) -> SoapSensor {
        SoapSensor {
            id: self.id.trim().to_string(),
            field: self
                .field
                .clone()
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| format!("sensor_{}", self.id.trim())),
            units: self.units.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SoapSources {
    #[serde(default = "yes")]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub sensors: Vec<SoapSensorEntry>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Default for SoapSources {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: String::new(),
            namespace: default_namespace(),
            site: String::new(),
            sensors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub timeseries: TimeseriesSources,
    pub site_sensor: SiteSensorSources,
    pub soap: SoapSources,
}

/// Load sources from an explicit TOML path.
pub fn load_sources_from(path: &Path) -> Result<SourcesConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    parse_sources(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Resolve the sources file:
/// 1) $INGEST_SOURCES_PATH (must exist)
/// 2) config/sources.toml
/// 3) built-in defaults
pub fn load_sources_with(env_path: Option<String>) -> Result<SourcesConfig> {
    if let Some(p) = env_path {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        }
        return Err(anyhow!(
            "{ENV_SOURCES_PATH} points to non-existent path {}",
            pb.display()
        ));
    }
    let default = PathBuf::from(DEFAULT_SOURCES_PATH);
    if default.exists() {
        return load_sources_from(&default);
    }
    Ok(SourcesConfig::default())
}

pub fn parse_sources(s: &str) -> Result<SourcesConfig> {
    let mut cfg: SourcesConfig = toml::from_str(s)?;
    cfg.timeseries.endpoints = clean_list(cfg.timeseries.endpoints);
    cfg.site_sensor.sensors = clean_list(cfg.site_sensor.sensors);
    Ok(cfg)
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    // keep configured order; drop blanks and repeats
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|x| x == t) {
            out.push(t.to_string());
        }
    }
    out
}
