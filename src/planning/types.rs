//! Domain objects for collective portfolio planning

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Agronomic and economic parameters of one crop choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropOption {
    pub name: String,

    /// Botanical family, e.g. "solanaceae", "poaceae"
    pub family: String,

    /// Growing season: "kharif", "rabi", "zaid"
    pub season: String,

    /// Historical average yield, quintals per hectare. Must be positive.
    pub avg_yield: f64,

    /// Yield standard deviation, quintals per hectare
    pub yield_std_dev: f64,

    /// Historical average price, ₹ per quintal
    pub avg_price: f64,

    /// Cultivation cost, ₹ per hectare. Must be positive.
    pub cultivation_cost: f64,

    /// Water requirement, cubic meters per hectare
    pub water_requirement: f64,

    /// Labor requirement, person-days per hectare
    pub labor_days: f64,

    /// Days from sowing to harvest
    pub growing_duration_days: u32,

    /// Compatible soil types
    #[serde(default)]
    pub soil_types: Vec<String>,

    /// Temperature tolerance band, °C
    pub min_temp: f64,
    pub max_temp: f64,
}

/// Resource bounds for one planning cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConstraints {
    /// Total land, hectares
    pub total_land: f64,

    /// Total water, cubic meters
    pub total_water: f64,

    /// Total labor, person-days
    pub total_labor: f64,

    /// Total budget, ₹
    pub total_budget: f64,

    /// Minimum number of distinct crops to allocate
    pub min_crop_diversity: usize,
}

/// A constraint sanity violation, returned as data rather than thrown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ConstraintViolation {
    NonPositiveLand { value: f64 },
    NonPositiveWater { value: f64 },
    NonPositiveLabor { value: f64 },
    NonPositiveBudget { value: f64 },
    ZeroCropDiversity,
}

impl std::fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintViolation::NonPositiveLand { value } => {
                write!(f, "total_land must be positive, got {}", value)
            }
            ConstraintViolation::NonPositiveWater { value } => {
                write!(f, "total_water must be positive, got {}", value)
            }
            ConstraintViolation::NonPositiveLabor { value } => {
                write!(f, "total_labor must be positive, got {}", value)
            }
            ConstraintViolation::NonPositiveBudget { value } => {
                write!(f, "total_budget must be positive, got {}", value)
            }
            ConstraintViolation::ZeroCropDiversity => {
                write!(f, "min_crop_diversity must be at least 1")
            }
        }
    }
}

impl PortfolioConstraints {
    /// Sanity-check the bounds. Call proactively; the optimizer refuses
    /// constraints with violations.
    pub fn validate(&self) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();
        if self.total_land <= 0.0 {
            violations.push(ConstraintViolation::NonPositiveLand {
                value: self.total_land,
            });
        }
        if self.total_water <= 0.0 {
            violations.push(ConstraintViolation::NonPositiveWater {
                value: self.total_water,
            });
        }
        if self.total_labor <= 0.0 {
            violations.push(ConstraintViolation::NonPositiveLabor {
                value: self.total_labor,
            });
        }
        if self.total_budget <= 0.0 {
            violations.push(ConstraintViolation::NonPositiveBudget {
                value: self.total_budget,
            });
        }
        if self.min_crop_diversity == 0 {
            violations.push(ConstraintViolation::ZeroCropDiversity);
        }
        violations
    }
}

/// Market data gathered (or substituted) for a planning cycle, keyed by
/// crop name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Forecast price per crop, ₹ per quintal
    #[serde(default)]
    pub price_forecasts: HashMap<String, f64>,

    /// Price volatility per crop, 0–1
    #[serde(default)]
    pub volatility: HashMap<String, f64>,

    /// Historical price series per crop, oldest first
    #[serde(default)]
    pub price_history: HashMap<String, Vec<f64>>,
}

impl MarketSnapshot {
    /// Fallback snapshot when market intelligence is unavailable: no
    /// forecasts, so every crop falls back to its historical averages and
    /// the conservative volatility constant.
    pub fn conservative() -> Self {
        Self::default()
    }
}

/// Forecast temperature band, °C
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempRange {
    pub min: f64,
    pub max: f64,
}

/// Climate data for a planning cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClimateOutlook {
    /// Climate risk score per crop, 0–1
    #[serde(default)]
    pub risk_scores: HashMap<String, f64>,

    /// Forecast temperature band for the season
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_forecast: Option<TempRange>,

    /// Fraction of normal water availability, 0–1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_availability: Option<f64>,
}

impl ClimateOutlook {
    /// Fallback outlook when climate advisory is unavailable: no scores,
    /// so every crop takes the conservative climate-risk constant.
    pub fn conservative() -> Self {
        Self::default()
    }
}

/// Satellite-derived yield forecasts, quintals per hectare, keyed by crop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YieldForecasts {
    #[serde(default)]
    pub predicted: HashMap<String, f64>,
}

/// One crop's share of the plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropAllocation {
    /// Index into the crop option list the plan was computed from
    pub crop_index: usize,
    pub crop_name: String,

    /// Hectares allocated
    pub land_area: f64,

    /// Expected return as a fraction of cultivation cost
    pub expected_return: f64,

    /// Composite risk, 0–1
    pub risk: f64,

    /// Cubic meters consumed by this allocation
    pub water_needed: f64,

    /// Person-days consumed
    pub labor_needed: f64,

    /// ₹ consumed
    pub cost_required: f64,
}

/// Fraction of each constrained resource the plan consumes, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUtilization {
    pub land_pct: f64,
    pub water_pct: f64,
    pub labor_pct: f64,
    pub budget_pct: f64,
}

/// Expected revenue per unit of consumed resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceEfficiency {
    /// ₹ per cubic meter of water
    pub water: f64,
    /// ₹ per person-day
    pub labor: f64,
    /// ₹ of revenue per ₹ of cost
    pub cost: f64,
}

/// Qualitative risk band for a score in 0–1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    pub fn from_score(risk: f64) -> Self {
        if risk < 0.3 {
            RiskCategory::Low
        } else if risk < 0.6 {
            RiskCategory::Medium
        } else {
            RiskCategory::High
        }
    }
}

/// The optimizer's output: allocation plus portfolio-level metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedPortfolio {
    pub allocations: Vec<CropAllocation>,

    /// Land-weighted expected return
    pub expected_return: f64,

    /// Pairwise-correlated portfolio standard deviation
    pub portfolio_risk: f64,

    pub sharpe_ratio: f64,

    /// Normalized Herfindahl index, 0 (single crop) to 1 (even spread)
    pub diversification_index: f64,

    pub risk_category: RiskCategory,

    pub total_water_usage: f64,
    pub total_labor_usage: f64,
    pub total_cost_required: f64,

    pub utilization: ResourceUtilization,
    pub efficiency: ResourceEfficiency,
}

/// Stress from the forecast band leaving a crop's tolerance band: each
/// degree outside contributes a tenth, capped at 1.0.
pub fn temperature_stress(crop: &CropOption, forecast: &TempRange) -> f64 {
    let cold_stress = (crop.min_temp - forecast.min).max(0.0) / 10.0;
    let heat_stress = (forecast.max - crop.max_temp).max(0.0) / 10.0;
    (cold_stress + heat_stress).min(1.0)
}
