// src/ingest/http.rs
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("enviro-ingest/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with a bounded per-request timeout, so one stuck
/// upstream cannot stall a whole poll cycle.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(USER_AGENT)
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }

    /// GET `url` and return the body. Non-2xx is an error.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url} non-2xx"))?;
        resp.text()
            .await
            .with_context(|| format!("GET {url} .text()"))
    }

    /// POST a SOAP 1.1 envelope. SOAP faults usually come back as HTTP 500
    /// with a body worth reading, so the body is returned for any status and
    /// the caller decides.
    pub async fn post_soap(&self, url: &str, action: &str, envelope: String) -> Result<(u16, String)> {
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", action)
            .body(envelope)
            .send()
            .await
            .with_context(|| format!("POST {url} ({action})"))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .with_context(|| format!("POST {url} ({action}) .text()"))?;
        Ok((status, body))
    }
}

/// Where adapters get raw payloads from: the network, or canned bodies keyed
/// by URL (GET) / SOAP action (POST) for offline runs and tests.
#[derive(Clone)]
pub enum Transport {
    Http(HttpClient),
    Fixtures(std::collections::HashMap<String, String>),
}

impl Transport {
    pub fn fixtures<I, K, V>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Fixtures(
            items
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        match self {
            Self::Http(c) => c.get_text(url).await,
            Self::Fixtures(m) => m
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no fixture for GET {url}")),
        }
    }

    pub async fn post_soap(&self, url: &str, action: &str, envelope: String) -> Result<(u16, String)> {
        match self {
            Self::Http(c) => c.post_soap(url, action, envelope).await,
            Self::Fixtures(m) => m
                .get(action)
                .cloned()
                .map(|body| (200, body))
                .ok_or_else(|| anyhow::anyhow!("no fixture for POST {url} ({action})")),
        }
    }
}
