use serde::{Deserialize, Serialize};

use crate::error::{FleetError, FleetResult};

pub const DEFAULT_TICK_INTERVAL_MS: f64 = 400.0;
pub const DEFAULT_ESTOP_COOLDOWN_MS: f64 = 6_000.0;
pub const DEFAULT_ERROR_PROBABILITY: f64 = 0.03;
pub const DEFAULT_SEED: u64 = 0x00D7_0001;

/// Simulator knobs. Every field has a default so the JS side may pass `{}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SimConfig {
    pub tick_interval_ms: f64,
    pub estop_cooldown_ms: f64,
    /// Chance per tick that a non-estopped robot faults.
    pub error_probability: f64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            estop_cooldown_ms: DEFAULT_ESTOP_COOLDOWN_MS,
            error_probability: DEFAULT_ERROR_PROBABILITY,
            seed: DEFAULT_SEED,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> FleetResult<()> {
        if !(self.tick_interval_ms.is_finite() && self.tick_interval_ms > 0.0) {
            return Err(FleetError::InvalidConfig(format!(
                "tick interval must be positive, got {}",
                self.tick_interval_ms
            )));
        }
        if !(self.estop_cooldown_ms.is_finite() && self.estop_cooldown_ms >= 0.0) {
            return Err(FleetError::InvalidConfig(format!(
                "e-stop cooldown must be non-negative, got {}",
                self.estop_cooldown_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.error_probability) {
            return Err(FleetError::InvalidConfig(format!(
                "error probability must lie in [0, 1], got {}",
                self.error_probability
            )));
        }
        Ok(())
    }
}

/// Canvas geometry and stroke used by the arm renderer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    pub width: f64,
    pub height: f64,
    pub base_x: f64,
    pub base_y: f64,
    pub link_lengths: [f64; 6],
    pub stroke_style: String,
    pub line_width: f64,
    pub line_cap: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 300.0,
            height: 200.0,
            base_x: 150.0,
            base_y: 160.0,
            link_lengths: [40.0, 35.0, 30.0, 25.0, 20.0, 15.0],
            stroke_style: "#60a5fa".to_string(),
            line_width: 12.0,
            line_cap: "round".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SimConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_interval_and_bad_probability() {
        let cfg = SimConfig { tick_interval_ms: 0.0, ..SimConfig::default() };
        assert!(matches!(cfg.validate(), Err(FleetError::InvalidConfig(_))));

        let cfg = SimConfig { error_probability: 1.5, ..SimConfig::default() };
        assert!(matches!(cfg.validate(), Err(FleetError::InvalidConfig(_))));

        let cfg = SimConfig { estop_cooldown_ms: f64::NAN, ..SimConfig::default() };
        assert!(matches!(cfg.validate(), Err(FleetError::InvalidConfig(_))));
    }

    #[test]
    fn render_defaults_match_canvas_layout() {
        let cfg = RenderConfig::default();
        assert_eq!((cfg.width, cfg.height), (300.0, 200.0));
        assert_eq!((cfg.base_x, cfg.base_y), (150.0, 160.0));
        assert_eq!(cfg.link_lengths.iter().sum::<f64>(), 165.0);
    }
}
