//! Investment unit calculator
//!
//! Normalizes heterogeneous member contributions (land, inputs, labor,
//! soil, water access, equipment) into a single comparable score and
//! distributes a profit pool proportionally. Validation returns structured
//! violation lists rather than errors: it is meant to be called proactively
//! before committing data.

use crate::config::InvestmentSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Sigmoid steepness for land normalization
const LAND_SIGMOID_STEEPNESS: f64 = 1.5;

/// A member's raw contribution factors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentFactors {
    /// Hectares contributed
    pub land_area: f64,

    /// Soil quality, already normalized to [0, 1]
    pub soil_quality: f64,

    /// Seasonal input spend, ₹
    pub inputs_value: f64,

    /// Labor contributed, person-days
    pub labor_days: f64,

    /// Water access score, already normalized to [0, 1]
    pub water_access: f64,

    /// Equipment value, ₹
    pub equipment_value: f64,
}

/// Relative importance of each factor. Always non-negative; a usable
/// weight vector sums to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentWeights {
    pub land: f64,
    pub inputs: f64,
    pub labor: f64,
    pub soil: f64,
    pub water: f64,
    pub equipment: f64,
}

impl Default for InvestmentWeights {
    fn default() -> Self {
        Self {
            land: 0.40,
            inputs: 0.20,
            labor: 0.15,
            soil: 0.10,
            water: 0.10,
            equipment: 0.05,
        }
    }
}

impl InvestmentWeights {
    pub fn sum(&self) -> f64 {
        self.land + self.inputs + self.labor + self.soil + self.water + self.equipment
    }

    /// Scale so the six weights sum to exactly 1.0
    fn renormalized(mut self) -> Self {
        let sum = self.sum();
        self.land /= sum;
        self.inputs /= sum;
        self.labor /= sum;
        self.soil /= sum;
        self.water /= sum;
        self.equipment /= sum;
        self
    }
}

/// Points contributed by each factor on the 0–100 unit scale
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub land: f64,
    pub inputs: f64,
    pub labor: f64,
    pub soil: f64,
    pub water: f64,
    pub equipment: f64,
}

/// A member's investment unit score with its per-factor breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitScore {
    pub units: f64,
    pub breakdown: FactorBreakdown,
}

/// A factor sanity violation, returned as data rather than thrown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FactorViolation {
    NonPositiveLand { value: f64 },
    LandAboveCeiling { value: f64, ceiling: f64 },
    SoilQualityOutOfRange { value: f64 },
    WaterAccessOutOfRange { value: f64 },
    NegativeInputsValue { value: f64 },
    NegativeLaborDays { value: f64 },
    NegativeEquipmentValue { value: f64 },
}

impl std::fmt::Display for FactorViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactorViolation::NonPositiveLand { value } => {
                write!(f, "land_area must be positive, got {}", value)
            }
            FactorViolation::LandAboveCeiling { value, ceiling } => {
                write!(f, "land_area {} exceeds smallholder ceiling {}", value, ceiling)
            }
            FactorViolation::SoilQualityOutOfRange { value } => {
                write!(f, "soil_quality must be in [0, 1], got {}", value)
            }
            FactorViolation::WaterAccessOutOfRange { value } => {
                write!(f, "water_access must be in [0, 1], got {}", value)
            }
            FactorViolation::NegativeInputsValue { value } => {
                write!(f, "inputs_value must not be negative, got {}", value)
            }
            FactorViolation::NegativeLaborDays { value } => {
                write!(f, "labor_days must not be negative, got {}", value)
            }
            FactorViolation::NegativeEquipmentValue { value } => {
                write!(f, "equipment_value must not be negative, got {}", value)
            }
        }
    }
}

/// A member's computed units, input to profit distribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberUnits {
    pub member_id: String,
    pub units: f64,
}

/// One member's share of a distributed profit pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitShare {
    pub member_id: String,
    pub units: f64,

    /// Share of total units, 0–1
    pub share: f64,

    /// Proportional share of the pool before deductions, ₹
    pub gross_share: f64,

    /// Member-specific deduction, ₹
    pub deduction: f64,

    /// Gross minus deduction, ₹
    pub net_profit: f64,
}

/// Qualitative FPO profile used to adapt the scoring weights to local
/// conditions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FpoProfile {
    /// Water is the binding constraint in this region
    #[serde(default)]
    pub water_scarce: bool,

    #[serde(default)]
    pub mechanization: MechanizationLevel,

    /// The cost line that dominates member spending, if one does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_cost: Option<CostDriver>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MechanizationLevel {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostDriver {
    Inputs,
    Labor,
}

/// Calculator carrying the normalization bounds for one deployment region
#[derive(Debug, Clone)]
pub struct InvestmentUnitCalculator {
    settings: InvestmentSettings,
}

impl Default for InvestmentUnitCalculator {
    fn default() -> Self {
        Self::new(InvestmentSettings::default())
    }
}

impl InvestmentUnitCalculator {
    pub fn new(settings: InvestmentSettings) -> Self {
        Self { settings }
    }

    /// Score a member's contribution on the 0–100 unit scale.
    ///
    /// Land is normalized with a sigmoid centered on the typical holding
    /// size so very large holdings saturate instead of dominating; monetary
    /// and labor factors are min-max clamped against configured caps; soil
    /// and water scores arrive already normalized. Deterministic for
    /// identical inputs.
    pub fn calculate_units(
        &self,
        factors: &InvestmentFactors,
        weights: Option<&InvestmentWeights>,
    ) -> UnitScore {
        let default_weights = InvestmentWeights::default();
        let weights = weights.unwrap_or(&default_weights);

        let land_norm = sigmoid(
            factors.land_area - self.settings.avg_land_holding_ha,
            LAND_SIGMOID_STEEPNESS,
        );
        let inputs_norm = min_max(factors.inputs_value, self.settings.max_inputs_value);
        let labor_norm = min_max(factors.labor_days, self.settings.max_labor_days);
        let equipment_norm = min_max(factors.equipment_value, self.settings.max_equipment_value);

        let breakdown = FactorBreakdown {
            land: land_norm * weights.land * 100.0,
            inputs: inputs_norm * weights.inputs * 100.0,
            labor: labor_norm * weights.labor * 100.0,
            soil: factors.soil_quality * weights.soil * 100.0,
            water: factors.water_access * weights.water * 100.0,
            equipment: equipment_norm * weights.equipment * 100.0,
        };
        let units = breakdown.land
            + breakdown.inputs
            + breakdown.labor
            + breakdown.soil
            + breakdown.water
            + breakdown.equipment;

        debug!("Calculated {:.2} investment units", units);
        UnitScore { units, breakdown }
    }

    /// Sanity-check raw factors before committing them. Returns every
    /// violated rule; an empty list means the factors are usable.
    pub fn validate_factors(&self, factors: &InvestmentFactors) -> Vec<FactorViolation> {
        let mut violations = Vec::new();
        if factors.land_area <= 0.0 {
            violations.push(FactorViolation::NonPositiveLand {
                value: factors.land_area,
            });
        } else if factors.land_area > self.settings.land_ceiling_ha {
            violations.push(FactorViolation::LandAboveCeiling {
                value: factors.land_area,
                ceiling: self.settings.land_ceiling_ha,
            });
        }
        if !(0.0..=1.0).contains(&factors.soil_quality) {
            violations.push(FactorViolation::SoilQualityOutOfRange {
                value: factors.soil_quality,
            });
        }
        if !(0.0..=1.0).contains(&factors.water_access) {
            violations.push(FactorViolation::WaterAccessOutOfRange {
                value: factors.water_access,
            });
        }
        if factors.inputs_value < 0.0 {
            violations.push(FactorViolation::NegativeInputsValue {
                value: factors.inputs_value,
            });
        }
        if factors.labor_days < 0.0 {
            violations.push(FactorViolation::NegativeLaborDays {
                value: factors.labor_days,
            });
        }
        if factors.equipment_value < 0.0 {
            violations.push(FactorViolation::NegativeEquipmentValue {
                value: factors.equipment_value,
            });
        }
        violations
    }

    /// Distribute a profit pool proportionally to member units, minus
    /// member-specific deductions, sorted by net profit descending. Gross
    /// shares sum to the pool (subject to floating-point rounding).
    pub fn distribute_profit(
        &self,
        total_profit: f64,
        members: &[MemberUnits],
        deductions: Option<&HashMap<String, f64>>,
    ) -> Vec<ProfitShare> {
        let total_units: f64 = members.iter().map(|m| m.units).sum();
        let mut shares: Vec<ProfitShare> = members
            .iter()
            .map(|member| {
                let share = if total_units > 0.0 {
                    member.units / total_units
                } else {
                    0.0
                };
                let gross_share = share * total_profit;
                let deduction = deductions
                    .and_then(|d| d.get(&member.member_id).copied())
                    .unwrap_or(0.0);
                ProfitShare {
                    member_id: member.member_id.clone(),
                    units: member.units,
                    share,
                    gross_share,
                    deduction,
                    net_profit: gross_share - deduction,
                }
            })
            .collect();

        shares.sort_by(|a, b| {
            b.net_profit
                .partial_cmp(&a.net_profit)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.member_id.cmp(&b.member_id))
        });
        shares
    }

    /// Adapt the default weight vector to local conditions, then
    /// renormalize so the six weights sum to exactly 1.0.
    pub fn suggest_weights(profile: &FpoProfile) -> InvestmentWeights {
        let mut weights = InvestmentWeights::default();

        if profile.water_scarce {
            weights.water += 0.05;
        }
        match profile.mechanization {
            MechanizationLevel::High => {
                weights.equipment += 0.05;
                weights.labor = (weights.labor - 0.05).max(0.0);
            }
            MechanizationLevel::Low => {
                weights.labor += 0.05;
                weights.equipment = (weights.equipment - 0.05).max(0.0);
            }
            MechanizationLevel::Medium => {}
        }
        match profile.dominant_cost {
            Some(CostDriver::Inputs) => weights.inputs += 0.05,
            Some(CostDriver::Labor) => weights.labor += 0.05,
            None => {}
        }

        weights.renormalized()
    }
}

fn sigmoid(x: f64, steepness: f64) -> f64 {
    1.0 / (1.0 + (-steepness * x).exp())
}

/// Linear min-max normalization against an upper bound, clamped to [0, 1]
fn min_max(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    (value / max).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typical_factors() -> InvestmentFactors {
        InvestmentFactors {
            land_area: 2.0,
            soil_quality: 0.5,
            inputs_value: 100_000.0,
            labor_days: 182.5,
            water_access: 0.5,
            equipment_value: 250_000.0,
        }
    }

    #[test]
    fn test_units_at_typical_midpoints() {
        let calc = InvestmentUnitCalculator::default();
        let score = calc.calculate_units(&typical_factors(), None);

        // Land at the sigmoid center contributes exactly half its weight;
        // every linear factor sits at its midpoint
        let expected = 0.5 * 0.40 * 100.0
            + 0.5 * 0.20 * 100.0
            + 0.5 * 0.15 * 100.0
            + 0.5 * 0.10 * 100.0
            + 0.5 * 0.10 * 100.0
            + 0.5 * 0.05 * 100.0;
        assert!((score.units - expected).abs() < 1e-9);
        assert!((score.units - 50.0).abs() < 1e-9);

        // Deterministic for identical inputs
        let again = calc.calculate_units(&typical_factors(), None);
        assert_eq!(score.units, again.units);
    }

    #[test]
    fn test_linear_factors_clamp_at_bounds() {
        let calc = InvestmentUnitCalculator::default();
        let mut factors = typical_factors();
        factors.inputs_value = 10_000_000.0;
        factors.equipment_value = 0.0;
        let score = calc.calculate_units(&factors, None);
        assert!((score.breakdown.inputs - 20.0).abs() < 1e-9);
        assert_eq!(score.breakdown.equipment, 0.0);
    }

    #[test]
    fn test_large_holdings_saturate() {
        let calc = InvestmentUnitCalculator::default();
        let mut small = typical_factors();
        small.land_area = 1.0;
        let mut large = typical_factors();
        large.land_area = 20.0;
        let mut vast = typical_factors();
        vast.land_area = 40.0;

        let small_land = calc.calculate_units(&small, None).breakdown.land;
        let large_land = calc.calculate_units(&large, None).breakdown.land;
        let vast_land = calc.calculate_units(&vast, None).breakdown.land;
        assert!(small_land < large_land);
        // 20 ha is already deep in the sigmoid tail
        assert!(vast_land - large_land < 0.01);
    }

    #[test]
    fn test_validate_factors_collects_all_violations() {
        let calc = InvestmentUnitCalculator::default();
        let factors = InvestmentFactors {
            land_area: -1.0,
            soil_quality: 1.5,
            inputs_value: -10.0,
            labor_days: -5.0,
            water_access: -0.1,
            equipment_value: -1.0,
        };
        let violations = calc.validate_factors(&factors);
        assert_eq!(violations.len(), 6);

        let factors = InvestmentFactors {
            land_area: 500.0,
            ..typical_factors()
        };
        let violations = calc.validate_factors(&factors);
        assert_eq!(
            violations,
            vec![FactorViolation::LandAboveCeiling {
                value: 500.0,
                ceiling: 50.0
            }]
        );

        assert!(calc.validate_factors(&typical_factors()).is_empty());
    }

    #[test]
    fn test_distribute_profit_conserves_pool() {
        let calc = InvestmentUnitCalculator::default();
        let members = vec![
            MemberUnits {
                member_id: "m-1".into(),
                units: 62.0,
            },
            MemberUnits {
                member_id: "m-2".into(),
                units: 25.0,
            },
            MemberUnits {
                member_id: "m-3".into(),
                units: 13.0,
            },
        ];
        let shares = calc.distribute_profit(300_000.0, &members, None);

        let gross_total: f64 = shares.iter().map(|s| s.gross_share).sum();
        assert!((gross_total - 300_000.0).abs() < 1e-6);
        // With no deductions, net sums to the pool too
        let net_total: f64 = shares.iter().map(|s| s.net_profit).sum();
        assert!((net_total - 300_000.0).abs() < 1e-6);
        // Sorted by net descending
        assert_eq!(shares[0].member_id, "m-1");
        assert_eq!(shares[2].member_id, "m-3");
    }

    #[test]
    fn test_distribute_profit_applies_deductions() {
        let calc = InvestmentUnitCalculator::default();
        let members = vec![
            MemberUnits {
                member_id: "m-1".into(),
                units: 50.0,
            },
            MemberUnits {
                member_id: "m-2".into(),
                units: 50.0,
            },
        ];
        let deductions = HashMap::from([("m-1".to_string(), 40_000.0)]);
        let shares = calc.distribute_profit(100_000.0, &members, Some(&deductions));

        // Equal gross, but the deducted member drops to second
        assert_eq!(shares[0].member_id, "m-2");
        assert!((shares[0].net_profit - 50_000.0).abs() < 1e-9);
        assert!((shares[1].net_profit - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_distribute_profit_zero_units() {
        let calc = InvestmentUnitCalculator::default();
        let members = vec![MemberUnits {
            member_id: "m-1".into(),
            units: 0.0,
        }];
        let shares = calc.distribute_profit(10_000.0, &members, None);
        assert_eq!(shares[0].gross_share, 0.0);
    }

    #[test]
    fn test_suggest_weights_always_sums_to_one() {
        let profiles = [
            FpoProfile::default(),
            FpoProfile {
                water_scarce: true,
                mechanization: MechanizationLevel::High,
                dominant_cost: Some(CostDriver::Inputs),
            },
            FpoProfile {
                water_scarce: true,
                mechanization: MechanizationLevel::Low,
                dominant_cost: Some(CostDriver::Labor),
            },
            FpoProfile {
                water_scarce: false,
                mechanization: MechanizationLevel::High,
                dominant_cost: None,
            },
        ];
        for profile in &profiles {
            let weights = InvestmentUnitCalculator::suggest_weights(profile);
            assert!(
                (weights.sum() - 1.0).abs() < 1e-9,
                "weights sum to {} for {:?}",
                weights.sum(),
                profile
            );
            for w in [
                weights.land,
                weights.inputs,
                weights.labor,
                weights.soil,
                weights.water,
                weights.equipment,
            ] {
                assert!(w >= 0.0);
            }
        }
    }

    #[test]
    fn test_suggest_weights_reflects_profile() {
        let defaults = InvestmentWeights::default();
        let scarce = InvestmentUnitCalculator::suggest_weights(&FpoProfile {
            water_scarce: true,
            ..Default::default()
        });
        assert!(scarce.water > defaults.water / defaults.sum());

        let mechanized = InvestmentUnitCalculator::suggest_weights(&FpoProfile {
            mechanization: MechanizationLevel::High,
            ..Default::default()
        });
        assert!(mechanized.equipment > defaults.equipment);
        assert!(mechanized.labor < defaults.labor);
    }
}
