//! Traffic patterns fed into the simulator.

use crate::error::{PolicyError, PolicyResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Base curve of a traffic pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Flat at the base rate
    Constant,
    /// Ramps linearly from the base rate to twice the base rate
    Linear,
    /// Flat with a 5x surge in the middle tenth of the window
    Spike,
    /// Sinusoidal around the base rate (four cycles over the window)
    Seasonal,
    /// Poisson-scattered burst multipliers over a flat base
    Bursty,
    /// Grows exponentially from the base rate to four times it
    Exponential,
}

/// A multiplier applied over `[start_s, end_s)` of the window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Variation {
    pub start_s: f64,
    pub end_s: f64,
    pub multiplier: f64,
}

/// Arrival-rate curve over a bounded window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrafficPattern {
    pub kind: PatternKind,
    /// Jobs per second at multiplier 1.0
    pub base_rate: f64,
    /// Window length in seconds
    pub duration_s: f64,
    /// Ordered variations layered over the base curve
    #[serde(default)]
    pub variations: Vec<Variation>,
}

impl TrafficPattern {
    pub fn new(kind: PatternKind, base_rate: f64, duration_s: f64) -> Self {
        Self {
            kind,
            base_rate,
            duration_s,
            variations: Vec::new(),
        }
    }

    pub fn with_variation(mut self, start_s: f64, end_s: f64, multiplier: f64) -> Self {
        self.variations.push(Variation {
            start_s,
            end_s,
            multiplier,
        });
        self
    }

    pub fn validate(&self) -> PolicyResult<()> {
        if self.base_rate <= 0.0 {
            return Err(PolicyError::InvalidConfiguration(
                "base rate must be > 0".to_string(),
            ));
        }
        if self.duration_s <= 0.0 {
            return Err(PolicyError::InvalidConfiguration(
                "duration must be > 0".to_string(),
            ));
        }
        for variation in &self.variations {
            if variation.end_s <= variation.start_s {
                return Err(PolicyError::InvalidConfiguration(
                    "variation end must be after its start".to_string(),
                ));
            }
            if variation.multiplier < 0.0 {
                return Err(PolicyError::InvalidConfiguration(
                    "variation multiplier must be >= 0".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Arrival rate λ(t) in jobs per second.
    ///
    /// `burst_multiplier` is the current bursty-pattern factor, owned by the
    /// simulator so the pattern itself stays deterministic.
    pub fn rate_at(&self, t: f64, burst_multiplier: f64) -> f64 {
        let progress = (t / self.duration_s).clamp(0.0, 1.0);

        let base = match self.kind {
            PatternKind::Constant => self.base_rate,
            PatternKind::Linear => self.base_rate * (1.0 + progress),
            PatternKind::Spike => {
                if (0.45..0.55).contains(&progress) {
                    self.base_rate * 5.0
                } else {
                    self.base_rate
                }
            }
            PatternKind::Seasonal => {
                let cycles = 4.0;
                self.base_rate * (1.0 + 0.5 * (progress * cycles * std::f64::consts::TAU).sin())
            }
            PatternKind::Bursty => self.base_rate * burst_multiplier,
            PatternKind::Exponential => self.base_rate * 4.0_f64.powf(progress),
        };

        let mut rate = base;
        for variation in &self.variations {
            if t >= variation.start_s && t < variation.end_s {
                rate *= variation.multiplier;
            }
        }
        rate.max(0.0)
    }
}
