use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::config::{ConfigError, EntryConfirmationConfig};
use crate::models::Direction;
use crate::strategies::AggregatedDecision;

/// A coordinator decision parked until the next candle confirms or rejects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEntry {
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    pub key_level: f64,
    pub detected_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signal_data: AggregatedDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationOutcome {
    Confirmed,
    Rejected,
    Expired,
    NotFound,
}

impl fmt::Display for ConfirmationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfirmationOutcome::Confirmed => "confirmed",
            ConfirmationOutcome::Rejected => "rejected",
            ConfirmationOutcome::Expired => "expired",
            ConfirmationOutcome::NotFound => "not found",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmationResult {
    pub outcome: ConfirmationOutcome,
    pub reason: String,
    /// The resolved entry; `None` only for unknown ids.
    pub entry: Option<PendingEntry>,
}

impl ConfirmationResult {
    pub fn confirmed(&self) -> bool {
        self.outcome == ConfirmationOutcome::Confirmed
    }
}

/// One-shot Pending -> {Confirmed, Rejected, Expired} gate. Every check
/// removes the entry, so an id resolves at most once.
pub struct EntryConfirmationManager {
    cfg: EntryConfirmationConfig,
    pending: HashMap<String, PendingEntry>,
    /// Replay clock; wall clock when unset.
    pub sim_time: Option<DateTime<Utc>>,
}

impl EntryConfirmationManager {
    pub fn new(cfg: EntryConfirmationConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            pending: HashMap::new(),
            sim_time: None,
        })
    }

    pub fn config(&self) -> &EntryConfirmationConfig {
        &self.cfg
    }

    fn now(&self) -> DateTime<Utc> {
        self.sim_time.unwrap_or_else(Utc::now)
    }

    fn expiry_seconds(&self, direction: Direction) -> i64 {
        match direction {
            Direction::Long => self.cfg.long_expiry_seconds,
            Direction::Short => self.cfg.short_expiry_seconds,
        }
    }

    fn tolerance_percent(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.cfg.long_tolerance_percent,
            Direction::Short => self.cfg.short_tolerance_percent,
        }
    }

    pub fn add_pending(
        &mut self,
        symbol: &str,
        direction: Direction,
        key_level: f64,
        signal_data: AggregatedDecision,
    ) -> String {
        let now = self.now();
        let base = format!("{}_{}_{}", symbol, direction, now.timestamp_millis());
        let mut id = base.clone();
        let mut n = 2;
        while self.pending.contains_key(&id) {
            id = format!("{}#{}", base, n);
            n += 1;
        }

        let entry = PendingEntry {
            id: id.clone(),
            symbol: symbol.to_string(),
            direction,
            key_level,
            detected_at: now,
            expires_at: now + Duration::seconds(self.expiry_seconds(direction)),
            signal_data,
        };
        info!(
            "Pending {} {} @ key {:.2} (expires {})",
            direction,
            symbol,
            key_level,
            entry.expires_at.format("%H:%M:%S")
        );
        self.pending.insert(id.clone(), entry);
        id
    }

    pub fn check_confirmation(&mut self, id: &str, close: f64) -> ConfirmationResult {
        let Some(entry) = self.pending.remove(id) else {
            return ConfirmationResult {
                outcome: ConfirmationOutcome::NotFound,
                reason: "not found".to_string(),
                entry: None,
            };
        };

        let now = self.now();
        if now > entry.expires_at {
            let reason = format!(
                "timeout: {}s window elapsed",
                self.expiry_seconds(entry.direction)
            );
            debug!("{} expired", entry.id);
            return ConfirmationResult {
                outcome: ConfirmationOutcome::Expired,
                reason,
                entry: Some(entry),
            };
        }

        let key = entry.key_level;
        if !key.is_finite() || key <= 0.0 || !close.is_finite() {
            return ConfirmationResult {
                outcome: ConfirmationOutcome::Rejected,
                reason: format!("invalid prices: key {} close {}", key, close),
                entry: Some(entry),
            };
        }

        let tolerance = key * self.tolerance_percent(entry.direction) / 100.0;
        let (held, distance_pct) = match entry.direction {
            Direction::Long => (close >= key - tolerance, (close - key) / key * 100.0),
            Direction::Short => (close <= key + tolerance, (key - close) / key * 100.0),
        };

        let (outcome, reason) = if !held {
            (
                ConfirmationOutcome::Rejected,
                format!(
                    "close {:.2} broke key level {:.2} (tolerance {:.2})",
                    close, key, tolerance
                ),
            )
        } else {
            match self.cfg.min_bounce_percent {
                Some(min) if distance_pct < min => (
                    ConfirmationOutcome::Rejected,
                    format!("bounce too weak: {:.3}% < {:.3}%", distance_pct, min),
                ),
                _ => (
                    ConfirmationOutcome::Confirmed,
                    format!("close {:.2} held key level {:.2}", close, key),
                ),
            }
        };

        info!("{} {}: {}", entry.id, outcome, reason);
        ConfirmationResult {
            outcome,
            reason,
            entry: Some(entry),
        }
    }

    /// Drops every entry past its deadline; returns how many went.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = self.now();
        let before = self.pending.len();
        self.pending.retain(|_, e| now <= e.expires_at);
        let removed = before - self.pending.len();
        if removed > 0 {
            debug!("Dropped {} expired pending entries", removed);
        }
        removed
    }

    pub fn cancel(&mut self, id: &str) -> bool {
        self.pending.remove(id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn get(&self, id: &str) -> Option<&PendingEntry> {
        self.pending.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{sample_decision, ts};

    fn manager() -> EntryConfirmationManager {
        let mut m = EntryConfirmationManager::new(EntryConfirmationConfig::default()).unwrap();
        m.sim_time = Some(ts(0));
        m
    }

    #[test]
    fn long_within_tolerance_confirms() {
        let mut m = manager();
        let id = m.add_pending("BTCUSDT", Direction::Long, 100.0, sample_decision());
        let r = m.check_confirmation(&id, 99.6);
        assert!(r.confirmed());
        assert_eq!(m.pending_count(), 0);
    }

    #[test]
    fn long_below_tolerance_rejects_and_resolves_once() {
        let mut m = manager();
        let id = m.add_pending("BTCUSDT", Direction::Long, 100.0, sample_decision());
        let r = m.check_confirmation(&id, 99.0);
        assert_eq!(r.outcome, ConfirmationOutcome::Rejected);
        assert!(r.entry.is_some());

        let again = m.check_confirmation(&id, 101.0);
        assert!(!again.confirmed());
        assert_eq!(again.reason, "not found");
    }

    #[test]
    fn short_is_symmetric() {
        let mut m = manager();
        let id = m.add_pending("BTCUSDT", Direction::Short, 100.0, sample_decision());
        assert!(m.check_confirmation(&id, 100.4).confirmed());
        let id = m.add_pending("BTCUSDT", Direction::Short, 100.0, sample_decision());
        assert!(!m.check_confirmation(&id, 101.0).confirmed());
    }

    #[test]
    fn expired_entry_times_out() {
        let mut m = manager();
        let id = m.add_pending("BTCUSDT", Direction::Long, 100.0, sample_decision());
        m.sim_time = Some(ts(601));
        let r = m.check_confirmation(&id, 100.0);
        assert_eq!(r.outcome, ConfirmationOutcome::Expired);
        assert!(r.reason.contains("timeout"));
        assert!(m.get(&id).is_none());
    }

    #[test]
    fn exactly_at_deadline_still_valid() {
        let mut m = manager();
        let id = m.add_pending("BTCUSDT", Direction::Long, 100.0, sample_decision());
        m.sim_time = Some(ts(600));
        assert!(m.check_confirmation(&id, 100.0).confirmed());
    }

    #[test]
    fn weak_bounce_rejected() {
        let mut cfg = EntryConfirmationConfig::default();
        cfg.min_bounce_percent = Some(0.2);
        let mut m = EntryConfirmationManager::new(cfg).unwrap();
        m.sim_time = Some(ts(0));

        let id = m.add_pending("BTCUSDT", Direction::Long, 100.0, sample_decision());
        let r = m.check_confirmation(&id, 100.1);
        assert_eq!(r.outcome, ConfirmationOutcome::Rejected);
        assert!(r.reason.contains("bounce too weak"));

        let id = m.add_pending("BTCUSDT", Direction::Long, 100.0, sample_decision());
        assert!(m.check_confirmation(&id, 100.3).confirmed());
    }

    #[test]
    fn colliding_ids_get_suffix() {
        let mut m = manager();
        let a = m.add_pending("BTCUSDT", Direction::Long, 100.0, sample_decision());
        let b = m.add_pending("BTCUSDT", Direction::Long, 101.0, sample_decision());
        assert_ne!(a, b);
        assert!(b.ends_with("#2"));
        assert_eq!(m.pending_count(), 2);
    }

    #[test]
    fn cleanup_and_cancel() {
        let mut m = manager();
        let a = m.add_pending("BTCUSDT", Direction::Long, 100.0, sample_decision());
        m.sim_time = Some(ts(300));
        let b = m.add_pending("BTCUSDT", Direction::Short, 100.0, sample_decision());
        m.sim_time = Some(ts(700));
        assert_eq!(m.cleanup_expired(), 1);
        assert!(m.get(&a).is_none());
        assert!(m.cancel(&b));
        assert!(!m.cancel(&b));
    }
}
