//! Decode tuning knobs threaded from the CLI into the transition matrix.

/// Tuning parameters for transition scoring.
///
/// `ovl_transition_cost` acts as the fallback when the four explicit OVL
/// edge costs are not set individually.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeTuningParams {
    pub speaker_switch_penalty: f64,
    pub leak_entry_bias: f64,
    pub ovl_transition_cost: f64,
    pub a_to_ovl_cost: Option<f64>,
    pub b_to_ovl_cost: Option<f64>,
    pub ovl_to_a_cost: Option<f64>,
    pub ovl_to_b_cost: Option<f64>,
}

impl Default for DecodeTuningParams {
    fn default() -> Self {
        Self {
            speaker_switch_penalty: -6.0,
            leak_entry_bias: -2.0,
            ovl_transition_cost: -3.0,
            a_to_ovl_cost: None,
            b_to_ovl_cost: None,
            ovl_to_a_cost: None,
            ovl_to_b_cost: None,
        }
    }
}

impl DecodeTuningParams {
    /// Shorthand for the three primary knobs.
    pub fn new(
        speaker_switch_penalty: f64,
        leak_entry_bias: f64,
        ovl_transition_cost: f64,
    ) -> Self {
        Self {
            speaker_switch_penalty,
            leak_entry_bias,
            ovl_transition_cost,
            ..Self::default()
        }
    }

    /// Explicit OVL edge costs in (A->OVL, B->OVL, OVL->A, OVL->B) order,
    /// falling back to `ovl_transition_cost`.
    pub fn resolved_ovl_costs(&self) -> (f64, f64, f64, f64) {
        (
            self.a_to_ovl_cost.unwrap_or(self.ovl_transition_cost),
            self.b_to_ovl_cost.unwrap_or(self.ovl_transition_cost),
            self.ovl_to_a_cost.unwrap_or(self.ovl_transition_cost),
            self.ovl_to_b_cost.unwrap_or(self.ovl_transition_cost),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = DecodeTuningParams::default();
        assert_eq!(params.speaker_switch_penalty, -6.0);
        assert_eq!(params.leak_entry_bias, -2.0);
        assert_eq!(params.ovl_transition_cost, -3.0);
    }

    #[test]
    fn test_resolved_ovl_costs_fallback() {
        let params = DecodeTuningParams::default();
        assert_eq!(params.resolved_ovl_costs(), (-3.0, -3.0, -3.0, -3.0));
    }

    #[test]
    fn test_resolved_ovl_costs_overrides() {
        let params = DecodeTuningParams {
            a_to_ovl_cost: Some(-1.0),
            ovl_to_b_cost: Some(-4.5),
            ..DecodeTuningParams::default()
        };
        assert_eq!(params.resolved_ovl_costs(), (-1.0, -3.0, -3.0, -4.5));
    }
}
