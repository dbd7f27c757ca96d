//! Portfolio optimizer
//!
//! A constrained, risk-aware crop allocator. The allocation step is a
//! greedy heuristic ranked by a Sharpe-like score, explicitly not a
//! mean-variance optimal solver. It sits behind [`AllocationStrategy`] so a
//! quadratic-programming solver could replace it without touching the rest
//! of the pipeline.
//!
//! Preconditions (caller input errors, not defended here): every crop has
//! positive `avg_yield` and positive `cultivation_cost`.

use crate::error::{MeshError, Result};
use crate::planning::types::{
    ClimateOutlook, CropAllocation, CropOption, MarketSnapshot, OptimizedPortfolio,
    PortfolioConstraints, ResourceEfficiency, ResourceUtilization, RiskCategory, YieldForecasts,
};
use tracing::{debug, info};

/// Risk-free rate used only to rank crops, not as a financial guarantee
pub const RISK_FREE_RATE: f64 = 0.05;

/// Conservative fallback when a crop has no volatility figure
const FALLBACK_PRICE_VOLATILITY: f64 = 0.2;

/// Conservative fallback when a crop has no climate risk score
const FALLBACK_CLIMATE_RISK: f64 = 0.5;

/// Allocations below this floor are not worth cultivating separately
const MIN_PLOT_HA: f64 = 0.1;

/// Leftover land below this threshold is not worth a top-up pass
const TOP_UP_THRESHOLD_HA: f64 = 0.5;

/// First-pass cap: at most 40% of remaining land per crop
const FIRST_PASS_LAND_CAP: f64 = 0.4;

/// Top-up cap: at most 30% of remaining land per crop
const TOP_UP_LAND_CAP: f64 = 0.3;

/// Heuristic correlations never exceed this
const CORRELATION_CAP: f64 = 0.9;

/// Per-crop figures derived before allocation
#[derive(Debug, Clone)]
pub struct CropScore {
    pub expected_return: f64,
    pub risk: f64,
    pub sharpe: f64,
}

/// Expected return as a fraction of cultivation cost, preferring forecast
/// yield and price over historical averages
pub fn expected_return(
    crop: &CropOption,
    market: &MarketSnapshot,
    yields: &YieldForecasts,
) -> f64 {
    let predicted_yield = yields
        .predicted
        .get(&crop.name)
        .copied()
        .unwrap_or(crop.avg_yield);
    let predicted_price = market
        .price_forecasts
        .get(&crop.name)
        .copied()
        .unwrap_or(crop.avg_price);
    (predicted_yield * predicted_price - crop.cultivation_cost) / crop.cultivation_cost
}

/// Composite crop risk: price volatility, yield variability, and climate
/// risk blended 40/40/20
pub fn crop_risk(crop: &CropOption, market: &MarketSnapshot, climate: &ClimateOutlook) -> f64 {
    let volatility = market
        .volatility
        .get(&crop.name)
        .copied()
        .unwrap_or(FALLBACK_PRICE_VOLATILITY);
    let yield_variability = crop.yield_std_dev / crop.avg_yield;
    let climate_risk = climate
        .risk_scores
        .get(&crop.name)
        .copied()
        .unwrap_or(FALLBACK_CLIMATE_RISK);
    0.4 * volatility + 0.4 * yield_variability + 0.2 * climate_risk
}

/// Pearson correlation over the shared prefix of two series. `None` when
/// fewer than two paired samples exist or either series has no variance.
fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let a = &a[..n];
    let b = &b[..n];
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// Additive similarity heuristic for crop pairs without usable price
/// history: base 0.1, +0.5 same family, +0.3 same season, +0.2 when water
/// requirements are within 20% of the larger, capped at 0.9.
fn heuristic_correlation(a: &CropOption, b: &CropOption) -> f64 {
    let mut correlation: f64 = 0.1;
    if a.family == b.family {
        correlation += 0.5;
    }
    if a.season == b.season {
        correlation += 0.3;
    }
    let larger = a.water_requirement.max(b.water_requirement);
    if larger > 0.0 && (a.water_requirement - b.water_requirement).abs() < 0.2 * larger {
        correlation += 0.2;
    }
    correlation.min(CORRELATION_CAP)
}

/// Normalized Herfindahl diversification index over allocated areas:
/// 0 when a single crop holds everything, approaching 1 as land spreads
/// evenly across many crops
pub fn diversification_index(areas: &[f64]) -> f64 {
    let total: f64 = areas.iter().sum();
    let n = areas.len();
    if n <= 1 || total <= 0.0 {
        return 0.0;
    }
    let herfindahl: f64 = areas.iter().map(|a| (a / total) * (a / total)).sum();
    (1.0 - herfindahl) / (1.0 - 1.0 / n as f64)
}

/// Pairwise crop correlation matrix: symmetric, 1.0 on the diagonal
pub fn correlation_matrix(crops: &[CropOption], market: &MarketSnapshot) -> Vec<Vec<f64>> {
    let n = crops.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let history_i = market.price_history.get(&crops[i].name);
            let history_j = market.price_history.get(&crops[j].name);
            let correlation = match (history_i, history_j) {
                (Some(a), Some(b)) => pearson(a, b)
                    .unwrap_or_else(|| heuristic_correlation(&crops[i], &crops[j])),
                _ => heuristic_correlation(&crops[i], &crops[j]),
            };
            matrix[i][j] = correlation;
            matrix[j][i] = correlation;
        }
    }
    matrix
}

/// The ranking + greedy-fill step, isolated so it can be swapped for a true
/// solver
pub trait AllocationStrategy: Send + Sync {
    fn allocate(
        &self,
        crops: &[CropOption],
        scores: &[CropScore],
        constraints: &PortfolioConstraints,
    ) -> Vec<CropAllocation>;
}

/// Two-pass greedy fill over a Sharpe-ranked crop list.
///
/// Pass 1 seeds diversity: each pick takes at most 40% of remaining land,
/// bounded by resource-implied maxima and an equal-share floor, until the
/// minimum crop count is reached. Pass 2 tops up remaining land across
/// unallocated crops at 30% of what remains per pick. The 30% cap means a
/// tight ranking tail can leave some land unallocated; acceptable for an
/// advisory heuristic.
#[derive(Debug, Default)]
pub struct GreedySharpeAllocator;

impl GreedySharpeAllocator {
    /// Land supportable by the remaining water, labor, and budget. A zero
    /// per-hectare requirement leaves that resource unconstraining.
    fn resource_implied_max(
        crop: &CropOption,
        remaining_water: f64,
        remaining_labor: f64,
        remaining_budget: f64,
    ) -> f64 {
        let water_max = if crop.water_requirement > 0.0 {
            remaining_water / crop.water_requirement
        } else {
            f64::INFINITY
        };
        let labor_max = if crop.labor_days > 0.0 {
            remaining_labor / crop.labor_days
        } else {
            f64::INFINITY
        };
        let budget_max = if crop.cultivation_cost > 0.0 {
            remaining_budget / crop.cultivation_cost
        } else {
            f64::INFINITY
        };
        water_max.min(labor_max).min(budget_max)
    }
}

impl AllocationStrategy for GreedySharpeAllocator {
    fn allocate(
        &self,
        crops: &[CropOption],
        scores: &[CropScore],
        constraints: &PortfolioConstraints,
    ) -> Vec<CropAllocation> {
        // Rank by Sharpe-like score, descending; index breaks ties so the
        // result is deterministic
        let mut ranking: Vec<usize> = (0..crops.len()).collect();
        ranking.sort_by(|&a, &b| {
            scores[b]
                .sharpe
                .partial_cmp(&scores[a].sharpe)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let mut remaining_land = constraints.total_land;
        let mut remaining_water = constraints.total_water;
        let mut remaining_labor = constraints.total_labor;
        let mut remaining_budget = constraints.total_budget;
        let mut allocations: Vec<CropAllocation> = Vec::new();

        let take = |index: usize,
                        area: f64,
                        remaining_land: &mut f64,
                        remaining_water: &mut f64,
                        remaining_labor: &mut f64,
                        remaining_budget: &mut f64,
                        allocations: &mut Vec<CropAllocation>| {
            let crop = &crops[index];
            let water_needed = area * crop.water_requirement;
            let labor_needed = area * crop.labor_days;
            let cost_required = area * crop.cultivation_cost;
            *remaining_land -= area;
            *remaining_water -= water_needed;
            *remaining_labor -= labor_needed;
            *remaining_budget -= cost_required;
            allocations.push(CropAllocation {
                crop_index: index,
                crop_name: crop.name.clone(),
                land_area: area,
                expected_return: scores[index].expected_return,
                risk: scores[index].risk,
                water_needed,
                labor_needed,
                cost_required,
            });
        };

        // Pass 1: seed the diversity floor
        for &index in &ranking {
            if allocations.len() >= constraints.min_crop_diversity {
                break;
            }
            let crop = &crops[index];
            let area = (FIRST_PASS_LAND_CAP * remaining_land)
                .min(Self::resource_implied_max(
                    crop,
                    remaining_water,
                    remaining_labor,
                    remaining_budget,
                ))
                .min(remaining_land / constraints.min_crop_diversity as f64);
            if area < MIN_PLOT_HA {
                continue;
            }
            take(
                index,
                area,
                &mut remaining_land,
                &mut remaining_water,
                &mut remaining_labor,
                &mut remaining_budget,
                &mut allocations,
            );
        }

        // Pass 2: top up remaining land across crops not yet allocated
        if remaining_land > TOP_UP_THRESHOLD_HA {
            let already: Vec<usize> = allocations.iter().map(|a| a.crop_index).collect();
            for &index in &ranking {
                if remaining_land < MIN_PLOT_HA {
                    break;
                }
                if already.contains(&index) {
                    continue;
                }
                let crop = &crops[index];
                let area = (TOP_UP_LAND_CAP * remaining_land).min(
                    Self::resource_implied_max(
                        crop,
                        remaining_water,
                        remaining_labor,
                        remaining_budget,
                    ),
                );
                if area < MIN_PLOT_HA {
                    continue;
                }
                take(
                    index,
                    area,
                    &mut remaining_land,
                    &mut remaining_water,
                    &mut remaining_labor,
                    &mut remaining_budget,
                    &mut allocations,
                );
            }
        }

        debug!(
            "Greedy allocation: {} crops, {:.2} ha unallocated",
            allocations.len(),
            remaining_land
        );
        allocations
    }
}

/// The full optimization pipeline: score, correlate, allocate, measure
pub struct PortfolioOptimizer {
    strategy: Box<dyn AllocationStrategy>,
}

impl Default for PortfolioOptimizer {
    fn default() -> Self {
        Self {
            strategy: Box::new(GreedySharpeAllocator),
        }
    }
}

impl PortfolioOptimizer {
    pub fn new(strategy: Box<dyn AllocationStrategy>) -> Self {
        Self { strategy }
    }

    /// Compute an allocation and its portfolio-level metrics
    pub fn optimize(
        &self,
        constraints: &PortfolioConstraints,
        crops: &[CropOption],
        market: &MarketSnapshot,
        climate: &ClimateOutlook,
        yields: &YieldForecasts,
    ) -> Result<OptimizedPortfolio> {
        let violations = constraints.validate();
        if !violations.is_empty() {
            let summary: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
            return Err(MeshError::Validation(summary.join("; ")));
        }

        let scores: Vec<CropScore> = crops
            .iter()
            .map(|crop| {
                let expected_return = expected_return(crop, market, yields);
                let risk = crop_risk(crop, market, climate);
                let sharpe = if risk > 0.0 {
                    (expected_return - RISK_FREE_RATE) / risk
                } else {
                    0.0
                };
                CropScore {
                    expected_return,
                    risk,
                    sharpe,
                }
            })
            .collect();

        let correlations = correlation_matrix(crops, market);
        let allocations = self.strategy.allocate(crops, &scores, constraints);
        let portfolio = Self::measure(constraints, allocations, &correlations);

        info!(
            "Optimized portfolio: {} crops, return {:.2}%, risk {:.2}%, sharpe {:.2}",
            portfolio.allocations.len(),
            portfolio.expected_return * 100.0,
            portfolio.portfolio_risk * 100.0,
            portfolio.sharpe_ratio
        );
        Ok(portfolio)
    }

    /// Portfolio metrics over a finished allocation
    fn measure(
        constraints: &PortfolioConstraints,
        allocations: Vec<CropAllocation>,
        correlations: &[Vec<f64>],
    ) -> OptimizedPortfolio {
        let total_land: f64 = allocations.iter().map(|a| a.land_area).sum();
        let total_water: f64 = allocations.iter().map(|a| a.water_needed).sum();
        let total_labor: f64 = allocations.iter().map(|a| a.labor_needed).sum();
        let total_cost: f64 = allocations.iter().map(|a| a.cost_required).sum();

        let (expected_return, portfolio_risk, diversification_index) = if total_land > 0.0 {
            let weights: Vec<f64> = allocations
                .iter()
                .map(|a| a.land_area / total_land)
                .collect();

            let expected_return: f64 = allocations
                .iter()
                .zip(&weights)
                .map(|(a, w)| w * a.expected_return)
                .sum();

            let mut variance = 0.0;
            for (i, a) in allocations.iter().enumerate() {
                for (j, b) in allocations.iter().enumerate() {
                    variance += weights[i]
                        * weights[j]
                        * a.risk
                        * b.risk
                        * correlations[a.crop_index][b.crop_index];
                }
            }
            let portfolio_risk = variance.sqrt();

            let areas: Vec<f64> = allocations.iter().map(|a| a.land_area).collect();
            (expected_return, portfolio_risk, diversification_index(&areas))
        } else {
            (0.0, 0.0, 0.0)
        };

        let sharpe_ratio = if portfolio_risk > 0.0 {
            (expected_return - RISK_FREE_RATE) / portfolio_risk
        } else {
            0.0
        };

        // Revenue per allocation follows from its return being measured
        // against cultivation cost
        let total_revenue: f64 = allocations
            .iter()
            .map(|a| a.cost_required * (1.0 + a.expected_return))
            .sum();

        OptimizedPortfolio {
            expected_return,
            portfolio_risk,
            sharpe_ratio,
            diversification_index,
            risk_category: RiskCategory::from_score(portfolio_risk),
            total_water_usage: total_water,
            total_labor_usage: total_labor,
            total_cost_required: total_cost,
            utilization: ResourceUtilization {
                land_pct: total_land / constraints.total_land * 100.0,
                water_pct: total_water / constraints.total_water * 100.0,
                labor_pct: total_labor / constraints.total_labor * 100.0,
                budget_pct: total_cost / constraints.total_budget * 100.0,
            },
            efficiency: ResourceEfficiency {
                water: if total_water > 0.0 {
                    total_revenue / total_water
                } else {
                    0.0
                },
                labor: if total_labor > 0.0 {
                    total_revenue / total_labor
                } else {
                    0.0
                },
                cost: if total_cost > 0.0 {
                    total_revenue / total_cost
                } else {
                    0.0
                },
            },
            allocations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn crop(name: &str, family: &str, season: &str, water: f64) -> CropOption {
        CropOption {
            name: name.into(),
            family: family.into(),
            season: season.into(),
            avg_yield: 40.0,
            yield_std_dev: 6.0,
            avg_price: 2000.0,
            cultivation_cost: 35_000.0,
            water_requirement: water,
            labor_days: 40.0,
            growing_duration_days: 120,
            soil_types: vec!["loamy".into()],
            min_temp: 10.0,
            max_temp: 30.0,
        }
    }

    fn roomy_constraints() -> PortfolioConstraints {
        PortfolioConstraints {
            total_land: 10.0,
            total_water: 100_000.0,
            total_labor: 500.0,
            total_budget: 500_000.0,
            min_crop_diversity: 2,
        }
    }

    #[test]
    fn test_expected_return_prefers_forecasts() {
        let wheat = crop("wheat", "poaceae", "rabi", 4500.0);
        let mut market = MarketSnapshot::default();
        market.price_forecasts.insert("wheat".into(), 2500.0);
        let mut yields = YieldForecasts::default();
        yields.predicted.insert("wheat".into(), 45.0);

        let with_forecasts = expected_return(&wheat, &market, &yields);
        assert!((with_forecasts - (45.0 * 2500.0 - 35_000.0) / 35_000.0).abs() < 1e-12);

        let historical = expected_return(&wheat, &MarketSnapshot::default(), &YieldForecasts::default());
        assert!((historical - (40.0 * 2000.0 - 35_000.0) / 35_000.0).abs() < 1e-12);
    }

    #[test]
    fn test_risk_uses_conservative_fallbacks() {
        let wheat = crop("wheat", "poaceae", "rabi", 4500.0);
        let risk = crop_risk(&wheat, &MarketSnapshot::default(), &ClimateOutlook::default());
        let expected = 0.4 * 0.2 + 0.4 * (6.0 / 40.0) + 0.2 * 0.5;
        assert!((risk - expected).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_matrix_symmetric_unit_diagonal() {
        let crops = vec![
            crop("wheat", "poaceae", "rabi", 4500.0),
            crop("mustard", "brassicaceae", "rabi", 2400.0),
            crop("rice", "poaceae", "kharif", 12_000.0),
        ];
        let mut market = MarketSnapshot::default();
        market
            .price_history
            .insert("wheat".into(), vec![1900.0, 2000.0, 2100.0, 2050.0]);
        market
            .price_history
            .insert("rice".into(), vec![1700.0, 1850.0, 1950.0, 1900.0]);

        let matrix = correlation_matrix(&crops, &market);
        for i in 0..crops.len() {
            assert_eq!(matrix[i][i], 1.0);
            for j in 0..crops.len() {
                assert!((matrix[i][j] - matrix[j][i]).abs() < 1e-12);
            }
        }
        // wheat/rice have history: Pearson, strongly positive here
        assert!(matrix[0][2] > 0.9);
        // wheat/mustard fall back to the heuristic: 0.1 + 0.3 same season
        assert!((matrix[0][1] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_heuristic_correlation_caps_at_point_nine() {
        let a = crop("a", "poaceae", "rabi", 4000.0);
        let b = crop("b", "poaceae", "rabi", 4100.0);
        // same family + same season + similar water = 0.1+0.5+0.3+0.2, capped
        assert_eq!(heuristic_correlation(&a, &b), 0.9);
    }

    #[test]
    fn test_allocation_respects_resource_bounds() {
        let crops = vec![
            crop("wheat", "poaceae", "rabi", 4500.0),
            crop("mustard", "brassicaceae", "rabi", 2400.0),
            crop("gram", "fabaceae", "rabi", 2000.0),
        ];
        let constraints = roomy_constraints();
        let portfolio = PortfolioOptimizer::default()
            .optimize(
                &constraints,
                &crops,
                &MarketSnapshot::default(),
                &ClimateOutlook::default(),
                &YieldForecasts::default(),
            )
            .unwrap();

        let eps = 1e-9;
        let land: f64 = portfolio.allocations.iter().map(|a| a.land_area).sum();
        assert!(land <= constraints.total_land + eps);
        assert!(portfolio.total_water_usage <= constraints.total_water + eps);
        assert!(portfolio.total_labor_usage <= constraints.total_labor + eps);
        assert!(portfolio.total_cost_required <= constraints.total_budget + eps);
    }

    #[test]
    fn test_diversity_floor_respected_with_equal_scores() {
        // Two identical crops: equal Sharpe-like scores, and either alone
        // could satisfy all constraints. Both must still be allocated.
        let crops = vec![
            crop("wheat", "poaceae", "rabi", 4500.0),
            crop("barley", "poaceae", "rabi", 4500.0),
        ];
        let constraints = roomy_constraints();
        let portfolio = PortfolioOptimizer::default()
            .optimize(
                &constraints,
                &crops,
                &MarketSnapshot::default(),
                &ClimateOutlook::default(),
                &YieldForecasts::default(),
            )
            .unwrap();
        assert_eq!(portfolio.allocations.len(), 2);
    }

    #[test]
    fn test_single_crop_diversification_is_zero() {
        let crops = vec![crop("wheat", "poaceae", "rabi", 4500.0)];
        let mut constraints = roomy_constraints();
        constraints.min_crop_diversity = 1;
        let portfolio = PortfolioOptimizer::default()
            .optimize(
                &constraints,
                &crops,
                &MarketSnapshot::default(),
                &ClimateOutlook::default(),
                &YieldForecasts::default(),
            )
            .unwrap();
        assert_eq!(portfolio.allocations.len(), 1);
        assert_eq!(portfolio.diversification_index, 0.0);
    }

    #[test]
    fn test_no_allocatable_crop_yields_zero_metrics() {
        // Budget too small for even the minimum plot
        let crops = vec![crop("wheat", "poaceae", "rabi", 4500.0)];
        let constraints = PortfolioConstraints {
            total_land: 10.0,
            total_water: 100_000.0,
            total_labor: 500.0,
            total_budget: 100.0,
            min_crop_diversity: 1,
        };
        let portfolio = PortfolioOptimizer::default()
            .optimize(
                &constraints,
                &crops,
                &MarketSnapshot::default(),
                &ClimateOutlook::default(),
                &YieldForecasts::default(),
            )
            .unwrap();
        assert!(portfolio.allocations.is_empty());
        assert_eq!(portfolio.expected_return, 0.0);
        assert_eq!(portfolio.portfolio_risk, 0.0);
        assert_eq!(portfolio.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_invalid_constraints_rejected() {
        let crops = vec![crop("wheat", "poaceae", "rabi", 4500.0)];
        let constraints = PortfolioConstraints {
            total_land: -1.0,
            total_water: 100.0,
            total_labor: 10.0,
            total_budget: 100.0,
            min_crop_diversity: 1,
        };
        let err = PortfolioOptimizer::default()
            .optimize(
                &constraints,
                &crops,
                &MarketSnapshot::default(),
                &ClimateOutlook::default(),
                &YieldForecasts::default(),
            )
            .unwrap_err();
        assert!(matches!(err, MeshError::Validation(_)));
    }

    #[test]
    fn test_top_up_pass_spreads_remaining_land() {
        // Give the second crop a clearly better score so ranking is stable,
        // then check the top-up pass reaches the rest of the list
        let mut crops = vec![
            crop("wheat", "poaceae", "rabi", 4500.0),
            crop("mustard", "brassicaceae", "rabi", 2400.0),
            crop("gram", "fabaceae", "rabi", 2000.0),
        ];
        crops[1].cultivation_cost = 20_000.0;

        let mut constraints = roomy_constraints();
        constraints.min_crop_diversity = 1;
        let portfolio = PortfolioOptimizer::default()
            .optimize(
                &constraints,
                &crops,
                &MarketSnapshot::default(),
                &ClimateOutlook::default(),
                &YieldForecasts::default(),
            )
            .unwrap();
        assert!(portfolio.allocations.len() > 1);
    }

    #[test]
    fn test_utilization_is_a_percentage() {
        let crops = vec![
            crop("wheat", "poaceae", "rabi", 4500.0),
            crop("mustard", "brassicaceae", "rabi", 2400.0),
        ];
        let constraints = roomy_constraints();
        let portfolio = PortfolioOptimizer::default()
            .optimize(
                &constraints,
                &crops,
                &MarketSnapshot::default(),
                &ClimateOutlook::default(),
                &YieldForecasts::default(),
            )
            .unwrap();
        let land: f64 = portfolio.allocations.iter().map(|a| a.land_area).sum();
        let expected_pct = land / constraints.total_land * 100.0;
        assert!((portfolio.utilization.land_pct - expected_pct).abs() < 1e-9);
        assert!(portfolio.utilization.budget_pct <= 100.0 + 1e-9);
    }

    #[test]
    fn test_zero_risk_sharpe_is_zero() {
        let mut market = MarketSnapshot::default();
        market.volatility.insert("wheat".into(), 0.0);
        let mut climate = ClimateOutlook::default();
        climate.risk_scores.insert("wheat".into(), 0.0);
        let mut wheat = crop("wheat", "poaceae", "rabi", 4500.0);
        wheat.yield_std_dev = 0.0;

        let risk = crop_risk(&wheat, &market, &climate);
        assert_eq!(risk, 0.0);

        let mut constraints = roomy_constraints();
        constraints.min_crop_diversity = 1;
        let portfolio = PortfolioOptimizer::default()
            .optimize(
                &constraints,
                &[wheat],
                &market,
                &climate,
                &YieldForecasts::default(),
            )
            .unwrap();
        assert_eq!(portfolio.portfolio_risk, 0.0);
        assert_eq!(portfolio.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_pearson_needs_two_samples_and_variance() {
        assert!(pearson(&[1.0], &[2.0]).is_none());
        assert!(pearson(&[1.0, 1.0], &[2.0, 3.0]).is_none());
        let r = pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        let r = pearson(&[1.0, 2.0, 3.0], &[6.0, 4.0, 2.0]).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    /// A sanity check that HashMap-free inputs stay deterministic: two runs
    /// over identical inputs produce identical allocations.
    #[test]
    fn test_optimize_is_deterministic() {
        let crops = vec![
            crop("wheat", "poaceae", "rabi", 4500.0),
            crop("mustard", "brassicaceae", "rabi", 2400.0),
            crop("gram", "fabaceae", "rabi", 2000.0),
        ];
        let constraints = roomy_constraints();
        let mut market = MarketSnapshot::default();
        market.volatility =
            HashMap::from([("wheat".into(), 0.15), ("mustard".into(), 0.25)]);

        let run = || {
            PortfolioOptimizer::default()
                .optimize(
                    &constraints,
                    &crops,
                    &market,
                    &ClimateOutlook::default(),
                    &YieldForecasts::default(),
                )
                .unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(a.allocations.len(), b.allocations.len());
        for (x, y) in a.allocations.iter().zip(&b.allocations) {
            assert_eq!(x.crop_name, y.crop_name);
            assert_eq!(x.land_area, y.land_area);
        }
    }
}
