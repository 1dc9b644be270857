use tracing::{debug, trace, warn};

use crate::config::{ConfigError, CoordinatorConfig};
use crate::models::SignalDirection;
use crate::strategies::signals::{AggregatedDecision, Signal, StrategyMarketData};
use crate::strategies::{Strategy, StrategyError};

const COORDINATOR_SOURCE: &str = "StrategyCoordinator";

struct RegisteredStrategy {
    name: String,
    priority: u8,
    realtime_only: bool,
    strategy: Box<dyn Strategy>,
}

/// A strategy that returned an error during the last evaluation.
#[derive(Debug, Clone)]
pub struct StrategyFailure {
    pub strategy: String,
    pub error: StrategyError,
}

#[derive(Debug, Default)]
struct Bucket<'a> {
    score: f64,
    weighted_confidence: f64,
    weight_sum: f64,
    confidence_sum: f64,
    signals: Vec<&'a Signal>,
}

impl<'a> Bucket<'a> {
    fn add(&mut self, signal: &'a Signal) {
        self.score += signal.score();
        self.weighted_confidence += signal.confidence * signal.weight;
        self.weight_sum += signal.weight;
        self.confidence_sum += signal.confidence;
        self.signals.push(signal);
    }

    fn avg_confidence(&self) -> f64 {
        if self.weight_sum > 0.0 {
            self.weighted_confidence / self.weight_sum
        } else if !self.signals.is_empty() {
            self.confidence_sum / self.signals.len() as f64
        } else {
            0.0
        }
    }
}

/// Runs every registered strategy and folds their signals into one
/// weighted decision.
pub struct StrategyCoordinator {
    config: CoordinatorConfig,
    strategies: Vec<RegisteredStrategy>,
    last_failures: Vec<StrategyFailure>,
}

impl StrategyCoordinator {
    pub fn new(config: CoordinatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            strategies: Vec::new(),
            last_failures: Vec::new(),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Adds a strategy, replacing any registered under the same name.
    /// Order stays ascending by priority; equal priorities keep insertion order.
    pub fn register_strategy(&mut self, strategy: Box<dyn Strategy>) {
        let name = strategy.name().to_string();
        self.unregister_strategy(&name);

        let entry = RegisteredStrategy {
            priority: strategy.priority(),
            realtime_only: strategy.is_realtime_only(),
            name,
            strategy,
        };
        let idx = self
            .strategies
            .partition_point(|s| s.priority <= entry.priority);
        debug!(
            "Registered strategy {} (priority {}{})",
            entry.name,
            entry.priority,
            if entry.realtime_only { ", realtime-only" } else { "" }
        );
        self.strategies.insert(idx, entry);
    }

    pub fn unregister_strategy(&mut self, name: &str) -> bool {
        let before = self.strategies.len();
        self.strategies.retain(|s| s.name != name);
        self.strategies.len() != before
    }

    pub fn set_thresholds(
        &mut self,
        min_score_ratio: f64,
        min_avg_confidence: f64,
    ) -> Result<(), ConfigError> {
        let updated = CoordinatorConfig {
            min_score_ratio,
            min_avg_confidence,
            ..self.config.clone()
        };
        updated.validate()?;
        self.config = updated;
        Ok(())
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn last_failures(&self) -> &[StrategyFailure] {
        &self.last_failures
    }

    /// Clears per-run state in every registered strategy.
    pub fn reset(&mut self) {
        for entry in &mut self.strategies {
            entry.strategy.reset();
        }
        self.last_failures.clear();
    }

    pub fn evaluate_strategies(
        &mut self,
        data: &StrategyMarketData,
        exclude_realtime_only: bool,
    ) -> Option<AggregatedDecision> {
        self.last_failures.clear();
        let mut signals: Vec<Signal> = Vec::new();

        for entry in &mut self.strategies {
            if exclude_realtime_only && entry.realtime_only {
                trace!("Skipping realtime-only strategy {}", entry.name);
                continue;
            }

            match entry
                .strategy
                .evaluate(data)
                .and_then(|s| s.map(|s| s.validate().map(|_| s)).transpose())
            {
                Ok(Some(signal)) => {
                    trace!(
                        "{} -> {} conf={:.1} w={:.2}",
                        entry.name,
                        signal.direction,
                        signal.confidence,
                        signal.weight
                    );
                    signals.push(signal);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Strategy {} failed: {}", entry.name, e);
                    self.last_failures.push(StrategyFailure {
                        strategy: entry.name.clone(),
                        error: e,
                    });
                }
            }
        }

        self.aggregate(&signals)
    }

    /// Weighted vote over already-collected signals.
    pub fn aggregate(&self, signals: &[Signal]) -> Option<AggregatedDecision> {
        let mut long = Bucket::default();
        let mut short = Bucket::default();
        let mut hold = Bucket::default();
        for s in signals {
            if let Err(e) = s.validate() {
                warn!("Dropping signal from {}: {}", s.source, e);
                continue;
            }
            match s.direction {
                SignalDirection::Long => long.add(s),
                SignalDirection::Short => short.add(s),
                SignalDirection::Hold => hold.add(s),
            }
        }

        let counted = long.signals.len() + short.signals.len() + hold.signals.len();
        let total = long.score + short.score + hold.score;
        if total <= 0.0 {
            debug!("No scoring signals ({} zero-weight)", counted);
            return None;
        }

        let (direction, winner) = if long.score > short.score && long.score > hold.score {
            (SignalDirection::Long, &long)
        } else if short.score > long.score && short.score > hold.score {
            (SignalDirection::Short, &short)
        } else {
            debug!(
                "No clear direction: long={:.3} short={:.3} hold={:.3}",
                long.score, short.score, hold.score
            );
            return None;
        };

        let ratio = winner.score / total;
        if ratio < self.config.min_score_ratio {
            debug!(
                "{} share {:.2} below min_score_ratio {:.2}",
                direction, ratio, self.config.min_score_ratio
            );
            return None;
        }

        let mut confidence = winner.avg_confidence();
        let supporting = winner.signals.len();
        if supporting < self.config.blind_zone_min_signals {
            confidence *= self.config.blind_zone_penalty;
            debug!(
                "Blind-zone penalty x{:.2}: only {} {} signal(s)",
                self.config.blind_zone_penalty, supporting, direction
            );
        }
        let confidence = confidence.clamp(self.config.confidence_penalty_floor, 100.0);

        if confidence < self.config.min_avg_confidence {
            debug!(
                "{} confidence {:.1} below min_avg_confidence {:.1}",
                direction, confidence, self.config.min_avg_confidence
            );
            return None;
        }

        let mut by_priority = winner.signals.clone();
        by_priority.sort_by_key(|s| s.priority);
        let lead = by_priority[0];
        let key_level = by_priority.iter().find_map(|s| s.key_level);
        let stop_loss = by_priority.iter().find_map(|s| s.stop_loss);
        let sources: Vec<&str> = by_priority.iter().map(|s| s.source.as_str()).collect();

        let reason = format!(
            "{} {} of {} signal(s) [{}] | score {:.3} long / {:.3} short / {:.3} hold ({:.0}% share) | conf {:.1}",
            direction,
            supporting,
            counted,
            sources.join("+"),
            long.score,
            short.score,
            hold.score,
            ratio * 100.0,
            confidence,
        );

        let signal = Signal {
            source: COORDINATOR_SOURCE.to_string(),
            direction,
            confidence,
            weight: ratio,
            priority: lead.priority,
            reason: reason.clone(),
            key_level,
            stop_loss,
        };

        Some(AggregatedDecision {
            valid: true,
            strategy_name: lead.source.clone(),
            signal: Some(signal),
            reason,
            long_score: long.score,
            short_score: short.score,
            hold_score: hold.score,
            supporting_signals: supporting,
            key_level,
            stop_loss,
        })
    }
}
