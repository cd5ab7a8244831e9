// src/config/mod.rs
//! Process configuration: env vars (after `.env` via dotenvy) plus the
//! sources file. Read once at startup; any error here is fatal.

pub mod sources;

use anyhow::{anyhow, bail, Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

use crate::ingest::providers::soap_session::{SoapCredentials, SoapSourceCfg};
use sources::{load_sources_with, SourcesConfig, ENV_SOURCES_PATH};

pub const ENV_STORE_URI: &str = "STORE_URI";
pub const ENV_STORE_URI_LEGACY: &str = "MONGO_URI";
pub const ENV_SOAP_EMAIL: &str = "SOAP_EMAIL";
pub const ENV_SOAP_PASSWORD: &str = "SOAP_PASSWORD";
pub const ENV_SOAP_ENDPOINT: &str = "SOAP_ENDPOINT";
pub const ENV_POLL_INTERVAL_SECS: &str = "POLL_INTERVAL_SECS";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";
pub const ENV_POLL_PARALLEL: &str = "POLL_PARALLEL";
pub const ENV_ALERT_COOLDOWN_SECS: &str = "ALERT_COOLDOWN_SECS";
pub const ENV_METRICS_ADDR: &str = "METRICS_ADDR";

pub const DEFAULT_STORE_URI: &str = "sqlite://data/readings.db";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15 * 60;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_ALERT_COOLDOWN_SECS: i64 = 3_600;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub store_uri: String,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
    pub parallel: bool,
    pub alert_cooldown_secs: i64,
    pub metrics_addr: Option<SocketAddr>,
    pub sources: SourcesConfig,
    /// Present iff the SOAP source is enabled.
    pub soap: Option<(SoapSourceCfg, SoapCredentials)>,
}

fn parse_secs(raw: Option<String>, name: &str, default: u64) -> Result<u64> {
    match raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => {
            let v: u64 = s
                .parse()
                .with_context(|| format!("{name} must be a whole number of seconds, got {s:?}"))?;
            if v == 0 {
                bail!("{name} must be > 0");
            }
            Ok(v)
        }
    }
}

fn parse_flag(raw: Option<String>) -> bool {
    matches!(
        raw.unwrap_or_default().trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup (env in production, a map in tests).
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_uri = non_empty(get(ENV_STORE_URI))
            .or_else(|| non_empty(get(ENV_STORE_URI_LEGACY)))
            .unwrap_or_else(|| DEFAULT_STORE_URI.to_string());

        let poll_interval = Duration::from_secs(parse_secs(
            get(ENV_POLL_INTERVAL_SECS),
            ENV_POLL_INTERVAL_SECS,
            DEFAULT_POLL_INTERVAL_SECS,
        )?);
        let http_timeout = Duration::from_secs(parse_secs(
            get(ENV_HTTP_TIMEOUT_SECS),
            ENV_HTTP_TIMEOUT_SECS,
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);

        let alert_cooldown_secs = match non_empty(get(ENV_ALERT_COOLDOWN_SECS)) {
            None => DEFAULT_ALERT_COOLDOWN_SECS,
            Some(s) => s
                .parse()
                .with_context(|| format!("{ENV_ALERT_COOLDOWN_SECS} invalid: {s:?}"))?,
        };

        let metrics_addr = non_empty(get(ENV_METRICS_ADDR))
            .map(|s| {
                s.parse::<SocketAddr>()
                    .with_context(|| format!("{ENV_METRICS_ADDR} invalid: {s:?}"))
            })
            .transpose()?;

        let mut sources = load_sources_with(non_empty(get(ENV_SOURCES_PATH)))?;
        if let Some(ep) = non_empty(get(ENV_SOAP_ENDPOINT)) {
            sources.soap.endpoint = ep;
        }

        let soap = if sources.soap.enabled {
            Some(soap_settings(&sources, &get)?)
        } else {
            None
        };

        Ok(Self {
            store_uri,
            poll_interval,
            http_timeout,
            parallel: parse_flag(get(ENV_POLL_PARALLEL)),
            alert_cooldown_secs,
            metrics_addr,
            sources,
            soap,
        })
    }
}

/// Credentials are checked here, at startup, not on first use.
fn soap_settings<F>(sources: &SourcesConfig, get: &F) -> Result<(SoapSourceCfg, SoapCredentials)>
where
    F: Fn(&str) -> Option<String>,
{
    let email = non_empty(get(ENV_SOAP_EMAIL));
    let password = get(ENV_SOAP_PASSWORD).filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(anyhow!(
            "SOAP source enabled but {ENV_SOAP_EMAIL}/{ENV_SOAP_PASSWORD} are not set \
             (set them, or disable it with `[soap] enabled = false`)"
        ));
    };

    let soap = &sources.soap;
    if soap.endpoint.trim().is_empty() {
        bail!("SOAP source enabled but no endpoint configured ({ENV_SOAP_ENDPOINT} or [soap].endpoint)");
    }
    if soap.sensors.is_empty() {
        bail!("SOAP source enabled but [[soap.sensors]] is empty");
    }
    let sensors: Vec<_> = soap.sensors.iter().map(|e| e.to_sensor()).collect();
    for s in &sensors {
        crate::store::validate_field(&s.field)
            .with_context(|| format!("[[soap.sensors]] id {:?}", s.id))?;
    }
    let site = if soap.site.trim().is_empty() {
        "soap".to_string()
    } else {
        soap.site.trim().to_string()
    };

    Ok((
        SoapSourceCfg {
            endpoint: soap.endpoint.trim().to_string(),
            namespace: soap.namespace.clone(),
            site,
            sensors,
        },
        SoapCredentials { email, password },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| m.get(k).cloned()
    }

    fn sources_file(body: &str) -> tempfile::NamedTempFile {
        let f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        std::fs::write(f.path(), body).unwrap();
        f
    }

    const SOAP_TOML: &str = r#"
        [soap]
        endpoint = "https://soap.example.test/Service.asmx"
        site = "River Station"
        [[soap.sensors]]
        id = "1001"
        field = "river_level"
        units = "m"
    "#;

    #[test]
    fn missing_soap_credentials_is_fatal() {
        let f = sources_file(SOAP_TOML);
        let path = f.path().display().to_string();
        let err = IngestConfig::from_lookup(lookup(&[(ENV_SOURCES_PATH, path.as_str())])).unwrap_err();
        assert!(err.to_string().contains(ENV_SOAP_EMAIL));
    }

    #[test]
    fn full_config_resolves() {
        let f = sources_file(SOAP_TOML);
        let path = f.path().display().to_string();
        let cfg = IngestConfig::from_lookup(lookup(&[
            (ENV_SOURCES_PATH, path.as_str()),
            (ENV_SOAP_EMAIL, "ops@example.org"),
            (ENV_SOAP_PASSWORD, "secret"),
            (ENV_STORE_URI_LEGACY, "sqlite://tmp/r.db"),
            (ENV_POLL_INTERVAL_SECS, "30"),
            (ENV_POLL_PARALLEL, "1"),
        ]))
        .unwrap();

        assert_eq!(cfg.store_uri, "sqlite://tmp/r.db");
        assert_eq!(cfg.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.http_timeout, Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
        assert!(cfg.parallel);
        let (soap, creds) = cfg.soap.unwrap();
        assert_eq!(soap.site, "River Station");
        assert_eq!(soap.sensors[0].field, "river_level");
        assert_eq!(creds.email, "ops@example.org");
    }

    #[test]
    fn disabled_soap_needs_no_credentials() {
        let f = sources_file("[soap]\nenabled = false\n");
        let path = f.path().display().to_string();
        let cfg = IngestConfig::from_lookup(lookup(&[(ENV_SOURCES_PATH, path.as_str())])).unwrap();
        assert!(cfg.soap.is_none());
        assert_eq!(cfg.poll_interval, Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));
        assert_eq!(cfg.store_uri, DEFAULT_STORE_URI);
    }

    #[test]
    fn reserved_soap_field_is_rejected_at_startup() {
        let f = sources_file(&SOAP_TOML.replace("river_level", "time"));
        let path = f.path().display().to_string();
        let err = IngestConfig::from_lookup(lookup(&[
            (ENV_SOURCES_PATH, path.as_str()),
            (ENV_SOAP_EMAIL, "ops@example.org"),
            (ENV_SOAP_PASSWORD, "secret"),
        ]))
        .unwrap_err();
        assert!(format!("{err:#}").contains("1001"));
    }

    #[test]
    fn zero_interval_rejected() {
        let f = sources_file("[soap]\nenabled = false\n");
        let path = f.path().display().to_string();
        assert!(IngestConfig::from_lookup(lookup(&[
            (ENV_SOURCES_PATH, path.as_str()),
            (ENV_POLL_INTERVAL_SECS, "0"),
        ]))
        .is_err());
    }
}
