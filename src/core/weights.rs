use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, WeightSystemConfig};
use crate::models::Direction;

/// Auxiliary context for one signal. Any `None` skips its modifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeightParams {
    pub direction: Direction,
    pub rsi: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub level_touches: Option<u32>,
    pub percent_b: Option<f64>,
    pub is_squeeze: bool,
    pub stoch_k: Option<f64>,
}

impl WeightParams {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            rsi: None,
            volume_ratio: None,
            level_touches: None,
            percent_b: None,
            is_squeeze: false,
            stoch_k: None,
        }
    }
}

/// Turns market context into multiplicative confidence modifiers centred on 1.0.
#[derive(Debug, Clone)]
pub struct WeightCalculator {
    cfg: WeightSystemConfig,
}

fn usable(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

impl WeightCalculator {
    pub fn new(cfg: WeightSystemConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &WeightSystemConfig {
        &self.cfg
    }

    pub fn rsi_modifier(&self, rsi: Option<f64>, direction: Direction) -> f64 {
        let c = &self.cfg.rsi;
        let Some(rsi) = usable(rsi) else { return 1.0 };
        if !self.cfg.enabled || !c.enabled {
            return 1.0;
        }

        match direction {
            Direction::Long => {
                if rsi <= c.extreme_oversold {
                    c.extreme_bonus
                } else if rsi <= c.oversold {
                    c.bonus
                } else if rsi >= c.extreme_overbought {
                    c.extreme_penalty
                } else if rsi >= c.overbought {
                    c.penalty
                } else {
                    1.0
                }
            }
            Direction::Short => {
                if rsi >= c.extreme_overbought {
                    c.extreme_bonus
                } else if rsi >= c.overbought {
                    c.bonus
                } else if rsi <= c.extreme_oversold {
                    c.extreme_penalty
                } else if rsi <= c.oversold {
                    c.penalty
                } else {
                    1.0
                }
            }
        }
    }

    pub fn volume_modifier(&self, ratio: Option<f64>) -> f64 {
        let c = &self.cfg.volume;
        let Some(ratio) = usable(ratio) else { return 1.0 };
        if !self.cfg.enabled || !c.enabled {
            return 1.0;
        }

        if ratio >= c.high_ratio {
            c.high_bonus
        } else if ratio <= c.low_ratio {
            c.low_penalty
        } else {
            1.0
        }
    }

    pub fn level_strength_modifier(&self, touches: Option<u32>) -> f64 {
        let c = &self.cfg.level_strength;
        let Some(touches) = touches else { return 1.0 };
        if !self.cfg.enabled || !c.enabled {
            return 1.0;
        }

        if touches >= c.strong_touches {
            c.strong_bonus
        } else if touches >= c.medium_touches {
            c.medium_bonus
        } else if touches <= 1 {
            c.weak_penalty
        } else {
            1.0
        }
    }

    pub fn bollinger_modifier(
        &self,
        percent_b: Option<f64>,
        direction: Direction,
        is_squeeze: bool,
    ) -> f64 {
        let c = &self.cfg.bollinger;
        let Some(pb) = usable(percent_b) else { return 1.0 };
        if !self.cfg.enabled || !c.enabled {
            return 1.0;
        }

        let (favourable, adverse) = match direction {
            Direction::Long => (pb <= c.lower_zone, pb >= c.upper_zone),
            Direction::Short => (pb >= c.upper_zone, pb <= c.lower_zone),
        };
        let base = if favourable {
            c.band_bonus
        } else if adverse {
            c.band_penalty
        } else {
            1.0
        };

        if is_squeeze {
            base * c.squeeze_multiplier
        } else {
            base
        }
    }

    /// %K in the favourable extreme, doubled up when RSI agrees.
    pub fn stochastic_modifier(
        &self,
        stoch_k: Option<f64>,
        rsi: Option<f64>,
        direction: Direction,
    ) -> f64 {
        let c = &self.cfg.stochastic;
        let Some(k) = usable(stoch_k) else { return 1.0 };
        if !self.cfg.enabled || !c.enabled {
            return 1.0;
        }
        let rsi = usable(rsi);

        let (favourable, adverse, rsi_agrees) = match direction {
            Direction::Long => (
                k <= c.oversold,
                k >= c.overbought,
                rsi.is_some_and(|r| r <= self.cfg.rsi.oversold),
            ),
            Direction::Short => (
                k >= c.overbought,
                k <= c.oversold,
                rsi.is_some_and(|r| r >= self.cfg.rsi.overbought),
            ),
        };

        if favourable && rsi_agrees {
            c.double_confirmation_bonus
        } else if favourable {
            c.bonus
        } else if adverse {
            c.penalty
        } else {
            1.0
        }
    }

    /// Base confidence times every applicable modifier, clamped to 0-100.
    pub fn apply_weights(&self, base_confidence: f64, params: &WeightParams) -> f64 {
        if !base_confidence.is_finite() {
            return 0.0;
        }
        if !self.cfg.enabled {
            return base_confidence.clamp(0.0, 100.0);
        }

        let d = params.direction;
        let multiplier = self.rsi_modifier(params.rsi, d)
            * self.volume_modifier(params.volume_ratio)
            * self.level_strength_modifier(params.level_touches)
            * self.bollinger_modifier(params.percent_b, d, params.is_squeeze)
            * self.stochastic_modifier(params.stoch_k, params.rsi, d);

        (base_confidence * multiplier).clamp(0.0, 100.0)
    }
}
