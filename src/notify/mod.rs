// src/notify/mod.rs
//! Loud alerts for persistent misconfiguration (e.g. a SOAP login that keeps
//! failing). Channels are opt-in via env; with none configured an alert is
//! still logged at error level.

pub mod antiflutter;
pub mod discord;
pub mod slack;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

use antiflutter::AntiFlutter;
use discord::DiscordNotifier;
use slack::SlackNotifier;

#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub source: String,  // adapter name
    pub message: String, // short, human readable
    pub ts: DateTime<Utc>,
}

impl AlertEvent {
    pub fn now(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            ts: Utc::now(),
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, ev: &AlertEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Fans an alert out to every enabled channel. Channel failures are logged,
/// never returned.
#[derive(Default)]
pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn from_env() -> Self {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
        let slack = SlackNotifier::from_env();
        if slack.enabled() {
            channels.push(Box::new(slack));
        }
        let discord = DiscordNotifier::from_env();
        if discord.enabled() {
            channels.push(Box::new(discord));
        }
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub async fn notify(&self, ev: &AlertEvent) {
        for ch in &self.channels {
            if let Err(e) = ch.send(ev).await {
                tracing::warn!(error = ?e, channel = ch.name(), "alert delivery failed");
            }
        }
    }
}

/// Mux + per-source cooldown. Shared by adapters that need to shout.
pub struct Alerter {
    mux: NotifierMux,
    gate: Mutex<AntiFlutter>,
}

impl Alerter {
    pub fn new(mux: NotifierMux, cooldown_secs: i64) -> Self {
        Self {
            mux,
            gate: Mutex::new(AntiFlutter::new(cooldown_secs)),
        }
    }

    /// Log at error level, then deliver unless the source is inside its
    /// cooldown. Returns whether channels were notified.
    pub async fn alert(&self, ev: AlertEvent) -> bool {
        tracing::error!(source = %ev.source, message = %ev.message, "ALERT");

        let allowed = {
            let mut gate = match self.gate.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            let ok = gate.should_alert(&ev.source, ev.ts);
            if ok {
                gate.record_alert(&ev.source, ev.ts);
            }
            ok
        };
        if !allowed {
            tracing::debug!(source = %ev.source, "alert suppressed by cooldown");
            return false;
        }
        self.mux.notify(&ev).await;
        true
    }
}
