// src/notify/antiflutter.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;

/// Per-source cooldown gate to prevent alert spam when the same source keeps
/// failing every cycle.
/// - First alert for a source always allowed.
/// - Inside cooldown, alerts for that source are suppressed.
/// - State is updated explicitly via `record_alert` after a send.
#[derive(Debug, Clone, Default)]
pub struct AntiFlutter {
    cooldown: ChronoDuration,
    last_alert_ts: HashMap<String, DateTime<Utc>>,
}

impl AntiFlutter {
    /// `cooldown_secs` < 0 is treated as 0 (no cooldown).
    pub fn new(cooldown_secs: i64) -> Self {
        let secs = cooldown_secs.max(0);
        Self {
            cooldown: ChronoDuration::seconds(secs),
            last_alert_ts: HashMap::new(),
        }
    }

    /// Check if we may alert at `now` for `source`. Does NOT mutate state.
    pub fn should_alert(&self, source: &str, now: DateTime<Utc>) -> bool {
        match self.last_alert_ts.get(source) {
            None => true,
            Some(ts) => now.signed_duration_since(*ts) >= self.cooldown,
        }
    }

    pub fn record_alert(&mut self, source: &str, now: DateTime<Utc>) {
        self.last_alert_ts.insert(source.to_string(), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn first_alert_passes() {
        let af = AntiFlutter::new(3_600);
        let now = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        assert!(af.should_alert("soap_session", now));
    }

    #[test]
    fn inside_cooldown_blocked_per_source() {
        let mut af = AntiFlutter::new(3_600);
        let t0 = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        af.record_alert("soap_session", t0);
        let t1 = t0 + ChronoDuration::seconds(120);
        assert!(!af.should_alert("soap_session", t1));
        assert!(af.should_alert("timeseries", t1));
    }

    #[test]
    fn after_cooldown_passes() {
        let mut af = AntiFlutter::new(3_600);
        let t0 = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        af.record_alert("soap_session", t0);
        let t_after = t0 + ChronoDuration::seconds(3_600 + 5);
        assert!(af.should_alert("soap_session", t_after));
    }
}
