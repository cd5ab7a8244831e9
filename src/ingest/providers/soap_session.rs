// src/ingest/providers/soap_session.rs
//! Adapter C: SOAP/XML session API.
//!
//! Two calls per invocation: `Login` (credentials -> token), then
//! `GetLatestReadings` (token + sensor ids -> readings). Raw readings are
//! integers in tenths of the physical unit.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::parse_naive_utc;
use crate::ingest::http::Transport;
use crate::ingest::types::{FetchOutcome, SourceAdapter};
use crate::model::RecordBatch;
use crate::notify::{AlertEvent, Alerter};

pub const RAW_DIVISOR: f64 = 10.0;
pub const DEFAULT_NAMESPACE: &str = "http://tempuri.org/";

#[derive(Clone, PartialEq, Eq)]
pub struct SoapCredentials {
    pub email: String,
    pub password: String,
}

// never print the password
impl fmt::Debug for SoapCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoapCredentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoapSensor {
    pub id: String,
    pub field: String,
    pub units: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoapSourceCfg {
    pub endpoint: String,
    pub namespace: String,
    /// Entity name the readings are stored under.
    pub site: String,
    pub sensors: Vec<SoapSensor>,
}

/// One `<Reading>` element, still raw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReading {
    pub sensor_id: String,
    pub timestamp: String,
    pub value: String,
}

fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
{body}
  </soap:Body>
</soap:Envelope>"#
    )
}

pub fn login_envelope(ns: &str, creds: &SoapCredentials) -> String {
    envelope(&format!(
        r#"    <Login xmlns="{}">
      <email>{}</email>
      <password>{}</password>
    </Login>"#,
        escape(ns),
        escape(creds.email.as_str()),
        escape(creds.password.as_str())
    ))
}

pub fn readings_envelope(ns: &str, token: &str, sensor_ids: &[&str]) -> String {
    let ids: String = sensor_ids
        .iter()
        .map(|id| format!("        <string>{}</string>\n", escape(*id)))
        .collect();
    envelope(&format!(
        r#"    <GetLatestReadings xmlns="{}">
      <token>{}</token>
      <sensorIds>
{ids}      </sensorIds>
    </GetLatestReadings>"#,
        escape(ns),
        escape(token)
    ))
}

/// Text of the first element whose local name is one of `names`.
fn first_text(xml: &str, names: &[&str]) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut inside = false;
    loop {
        match reader.read_event().context("reading soap xml")? {
            Event::Start(e) => {
                let local = e.local_name();
                inside = names.iter().any(|n| local.as_ref() == n.as_bytes());
            }
            Event::Text(t) if inside => return Ok(Some(t.unescape()?.into_owned())),
            Event::CData(t) if inside => {
                return Ok(Some(String::from_utf8_lossy(&t.into_inner()).into_owned()))
            }
            Event::End(_) => inside = false,
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

const GENERIC_FAULT: &str = "SOAP fault";

/// `Some(message)` when the body is a SOAP fault: a `Fault` element directly
/// under `Body`. The message is `faultstring` (1.1) or `Reason/Text` (1.2).
pub fn parse_fault(xml: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut fault_depth: Option<usize> = None;
    let mut message: Option<String> = None;
    loop {
        match reader.read_event().context("reading soap xml")? {
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                if fault_depth.is_none()
                    && local == b"Fault"
                    && path.last().is_some_and(|p| p == b"Body")
                {
                    fault_depth = Some(path.len());
                }
                path.push(local);
            }
            Event::Empty(e) => {
                if fault_depth.is_none()
                    && e.local_name().as_ref() == b"Fault"
                    && path.last().is_some_and(|p| p == b"Body")
                {
                    return Ok(Some(GENERIC_FAULT.into()));
                }
            }
            Event::Text(t) if fault_depth.is_some() && message.is_none() => {
                let is_message = match path.as_slice() {
                    [.., last] if last == b"faultstring" => true,
                    [.., parent, last] => parent == b"Reason" && last == b"Text",
                    _ => false,
                };
                if is_message {
                    message = Some(t.unescape()?.trim().to_string());
                }
            }
            Event::End(_) => {
                path.pop();
                if fault_depth == Some(path.len()) {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(fault_depth.map(|_| message.unwrap_or_else(|| GENERIC_FAULT.into())))
}

pub fn parse_login_token(xml: &str) -> Result<String> {
    if let Some(fault) = parse_fault(xml)? {
        bail!("login fault: {fault}");
    }
    first_text(xml, &["LoginResult", "Token", "token"])?
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.trim().to_string())
        .ok_or_else(|| anyhow!("login response carried no token"))
}

pub fn parse_readings(xml: &str) -> Result<Vec<RawReading>> {
    if let Some(fault) = parse_fault(xml)? {
        bail!("readings fault: {fault}");
    }
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = Vec::new();
    let mut current: Option<RawReading> = None;
    let mut child: Vec<u8> = Vec::new();
    loop {
        match reader.read_event().context("reading soap xml")? {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"Reading" {
                    current = Some(RawReading::default());
                } else {
                    child = name;
                }
            }
            Event::Text(t) => {
                if let Some(r) = current.as_mut() {
                    let text = t.unescape()?.into_owned();
                    match child.as_slice() {
                        b"SensorId" => r.sensor_id = text,
                        b"Timestamp" => r.timestamp = text,
                        b"Value" => r.value = text,
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"Reading" {
                    if let Some(r) = current.take() {
                        out.push(r);
                    }
                }
                child.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Scale one raw reading: integer tenths -> physical unit.
pub fn scale_raw(raw: &str) -> Result<f64> {
    let v: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("raw reading {raw:?} is not an integer"))?;
    Ok(v as f64 / RAW_DIVISOR)
}

pub struct SoapSessionAdapter {
    cfg: SoapSourceCfg,
    creds: SoapCredentials,
    transport: Transport,
    alerter: Option<Arc<Alerter>>,
}

impl SoapSessionAdapter {
    pub fn new(cfg: SoapSourceCfg, creds: SoapCredentials, transport: Transport) -> Self {
        Self {
            cfg,
            creds,
            transport,
            alerter: None,
        }
    }

    pub fn with_alerter(mut self, alerter: Arc<Alerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    fn action(&self, op: &str) -> String {
        format!("{}{}", self.cfg.namespace, op)
    }

    async fn login(&self) -> Result<String> {
        let env = login_envelope(&self.cfg.namespace, &self.creds);
        let (status, body) = self
            .transport
            .post_soap(&self.cfg.endpoint, &self.action("Login"), env)
            .await?;
        match parse_login_token(&body) {
            Ok(token) => Ok(token),
            Err(e) => Err(e.context(format!("login rejected (HTTP {status})"))),
        }
    }

    /// Turn raw readings into one outcome per configured sensor.
    pub fn outcomes(&self, raw: &[RawReading]) -> Vec<FetchOutcome> {
        let mut by_id: BTreeMap<&str, Vec<&RawReading>> = BTreeMap::new();
        for r in raw {
            by_id.entry(r.sensor_id.trim()).or_default().push(r);
        }

        let mut out = Vec::with_capacity(self.cfg.sensors.len());
        for sensor in &self.cfg.sensors {
            let Some(rows) = by_id.get(sensor.id.as_str()) else {
                out.push(FetchOutcome::empty(sensor.id.as_str()));
                continue;
            };
            let points: Result<Vec<_>> = rows
                .iter()
                .map(|r| Ok((parse_naive_utc(&r.timestamp)?, scale_raw(&r.value)?)))
                .collect();
            match points {
                Ok(points) => out.push(FetchOutcome::Batch(RecordBatch::new(
                    self.cfg.site.as_str(),
                    sensor.field.as_str(),
                    sensor.units.as_str(),
                    points,
                ))),
                Err(e) => {
                    tracing::warn!(error = ?e, provider = "soap_session", sensor = %sensor.id, "bad reading");
                    counter!("ingest_subsource_failures_total").increment(1);
                    out.push(FetchOutcome::failed(sensor.id.as_str(), format!("{e:#}")));
                }
            }
        }
        out
    }
}

#[async_trait]
impl SourceAdapter for SoapSessionAdapter {
    async fn fetch(&self) -> Result<Vec<FetchOutcome>> {
        let token = match self.login().await {
            Ok(t) => t,
            Err(e) => {
                if let Some(alerter) = &self.alerter {
                    let msg = format!("SOAP login to {} failed: {e:#}", self.cfg.endpoint);
                    alerter.alert(AlertEvent::now(self.name(), msg)).await;
                }
                return Err(e.context("soap session login"));
            }
        };

        let ids: Vec<&str> = self.cfg.sensors.iter().map(|s| s.id.as_str()).collect();
        let env = readings_envelope(&self.cfg.namespace, &token, &ids);
        let (status, body) = self
            .transport
            .post_soap(&self.cfg.endpoint, &self.action("GetLatestReadings"), env)
            .await
            .context("soap readings request")?;
        let raw = parse_readings(&body)
            .with_context(|| format!("parsing readings response (HTTP {status})"))?;

        Ok(self.outcomes(&raw))
    }

    fn name(&self) -> &'static str {
        "soap_session"
    }
}
