//! Collective planning engine
//!
//! Pure computation consumed by the collective-management agent:
//! - Portfolio optimizer: risk-aware greedy crop allocation under land,
//!   water, labor, and budget constraints
//! - Investment unit calculator: normalizes heterogeneous member
//!   contributions into one comparable score and distributes profit
//!   proportionally

pub mod investment;
pub mod optimizer;
pub mod types;

pub use investment::{
    CostDriver, FactorBreakdown, FactorViolation, FpoProfile, InvestmentFactors,
    InvestmentUnitCalculator, InvestmentWeights, MechanizationLevel, MemberUnits, ProfitShare,
    UnitScore,
};
pub use optimizer::{
    correlation_matrix, crop_risk, diversification_index, expected_return, AllocationStrategy,
    GreedySharpeAllocator, PortfolioOptimizer, RISK_FREE_RATE,
};
pub use types::{
    temperature_stress, ClimateOutlook, ConstraintViolation, CropAllocation, CropOption,
    MarketSnapshot, OptimizedPortfolio, PortfolioConstraints, ResourceEfficiency,
    ResourceUtilization, RiskCategory, TempRange, YieldForecasts,
};
