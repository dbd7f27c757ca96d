//! Collective Management & Governance Agent (CMGA)
//!
//! Drives collective portfolio planning through the mesh: gathers market,
//! climate, and yield data from peer agents in parallel, substitutes
//! conservative fallbacks for any dependency that times out or fails (an
//! approximate answer beats total failure for an advisory system), runs the
//! optimizer, writes the plan back into FPO context, and broadcasts a
//! planning event. Also serves investment-unit scoring and profit
//! distribution.

use crate::agent::{Agent, AgentHandle, CapabilityDeclaration};
use crate::bus::{Delivery, MessageBus};
use crate::config::{InvestmentSettings, PlanningSettings};
use crate::context::{ContextSlice, EntityId};
use crate::error::Result;
use crate::planning::{
    temperature_stress, ClimateOutlook, CropOption, FactorViolation, FpoProfile,
    InvestmentFactors, InvestmentUnitCalculator, InvestmentWeights, MarketSnapshot, MemberUnits,
    OptimizedPortfolio, PortfolioConstraints, PortfolioOptimizer, ProfitShare, UnitScore,
    YieldForecasts,
};
use crate::protocol::{AgentRole, MessageContext, MessageType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Requests the CMGA serves
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectiveRequest {
    PlanPortfolio {
        fpo_id: String,
        constraints: PortfolioConstraints,
        crop_options: Vec<CropOption>,
    },
    CalculateUnits {
        member_id: String,
        factors: InvestmentFactors,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weights: Option<InvestmentWeights>,
    },
    ValidateFactors {
        member_id: String,
        factors: InvestmentFactors,
    },
    DistributeProfit {
        fpo_id: String,
        total_profit: f64,
        members: Vec<MemberUnits>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deductions: Option<HashMap<String, f64>>,
    },
    SuggestWeights {
        profile: FpoProfile,
    },
}

/// Request shape served by the market intelligence agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketRequest {
    MarketSnapshot { crops: Vec<String> },
}

/// Request shape served by the climate advisory agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClimateRequest {
    ClimateOutlook {
        crops: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
}

/// Request shape served by the geo-agronomy agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgronomyRequest {
    YieldForecasts { crops: Vec<String> },
}

/// Per-crop advisory attached to a finished plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropAdvisory {
    pub crop_name: String,

    /// Forecast-vs-tolerance temperature stress, 0–1
    pub temperature_stress: f64,
}

/// The CMGA's answer to a plan request, also carried by the broadcast event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub fpo_id: String,
    pub portfolio: OptimizedPortfolio,

    /// Names of dependencies that fell back ("market", "climate", "yields")
    #[serde(default)]
    pub degraded_dependencies: Vec<String>,

    #[serde(default)]
    pub advisories: Vec<CropAdvisory>,
}

/// Events the CMGA broadcasts for other agents and the UI to observe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectiveEvent {
    PortfolioPlanned(PlanOutcome),
}

pub struct CollectiveAgent {
    handle: AgentHandle,
    optimizer: PortfolioOptimizer,
    calculator: InvestmentUnitCalculator,
    planning: PlanningSettings,
}

impl CollectiveAgent {
    pub fn new(
        bus: MessageBus,
        planning: PlanningSettings,
        investment: InvestmentSettings,
    ) -> Self {
        Self {
            handle: AgentHandle::new(AgentRole::CollectiveManagement, bus),
            optimizer: PortfolioOptimizer::default(),
            calculator: InvestmentUnitCalculator::new(investment),
            planning,
        }
    }

    /// Swap the allocation pipeline, e.g. for a true solver
    pub fn with_optimizer(mut self, optimizer: PortfolioOptimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    fn dependency_timeout(&self) -> Duration {
        Duration::from_millis(self.planning.dependency_timeout_ms)
    }

    async fn gather_market(
        &self,
        crops: &[String],
        context: &MessageContext,
    ) -> (MarketSnapshot, bool) {
        let payload = MarketRequest::MarketSnapshot {
            crops: crops.to_vec(),
        };
        let result = self
            .handle
            .request_from_agent(
                AgentRole::MarketIntelligence,
                serde_json::to_value(payload).expect("market request serializes"),
                Some(context.clone()),
                Some(self.dependency_timeout()),
            )
            .await
            .and_then(|value| Ok(serde_json::from_value::<MarketSnapshot>(value)?));
        match result {
            Ok(snapshot) => (snapshot, false),
            Err(e) => {
                warn!("Market data unavailable, planning with conservative fallback: {}", e);
                (MarketSnapshot::conservative(), true)
            }
        }
    }

    async fn gather_climate(
        &self,
        crops: &[String],
        context: &MessageContext,
    ) -> (ClimateOutlook, bool) {
        let payload = ClimateRequest::ClimateOutlook {
            crops: crops.to_vec(),
            location: context.location.clone(),
        };
        let result = self
            .handle
            .request_from_agent(
                AgentRole::ClimateAdvisory,
                serde_json::to_value(payload).expect("climate request serializes"),
                Some(context.clone()),
                Some(self.dependency_timeout()),
            )
            .await
            .and_then(|value| Ok(serde_json::from_value::<ClimateOutlook>(value)?));
        match result {
            Ok(outlook) => (outlook, false),
            Err(e) => {
                warn!("Climate outlook unavailable, planning with conservative fallback: {}", e);
                (ClimateOutlook::conservative(), true)
            }
        }
    }

    async fn gather_yields(
        &self,
        crops: &[String],
        context: &MessageContext,
    ) -> (YieldForecasts, bool) {
        let payload = AgronomyRequest::YieldForecasts {
            crops: crops.to_vec(),
        };
        let result = self
            .handle
            .request_from_agent(
                AgentRole::GeoAgronomy,
                serde_json::to_value(payload).expect("agronomy request serializes"),
                Some(context.clone()),
                Some(self.dependency_timeout()),
            )
            .await
            .and_then(|value| Ok(serde_json::from_value::<YieldForecasts>(value)?));
        match result {
            Ok(forecasts) => (forecasts, false),
            Err(e) => {
                warn!(
                    "Yield forecasts unavailable, planning from historical averages: {}",
                    e
                );
                (YieldForecasts::default(), true)
            }
        }
    }

    /// The full planning workflow: gather, optimize, persist, announce.
    /// Each dependency's timeout is independent; a fallback never fails the
    /// whole plan.
    pub async fn plan_portfolio(
        &self,
        fpo_id: String,
        constraints: PortfolioConstraints,
        crop_options: Vec<CropOption>,
        inbound_context: Option<&MessageContext>,
    ) -> Result<PlanOutcome> {
        let crop_names: Vec<String> = crop_options.iter().map(|c| c.name.clone()).collect();
        let mut context = MessageContext::for_fpo(fpo_id.clone());
        if let Some(inbound) = inbound_context {
            context.merge(inbound);
            context.fpo_id = Some(fpo_id.clone());
        }

        info!(
            "Planning portfolio for {} over {} crop options",
            fpo_id,
            crop_options.len()
        );

        let ((market, market_degraded), (climate, climate_degraded), (yields, yields_degraded)) = tokio::join!(
            self.gather_market(&crop_names, &context),
            self.gather_climate(&crop_names, &context),
            self.gather_yields(&crop_names, &context),
        );

        let mut degraded = Vec::new();
        if market_degraded {
            degraded.push("market".to_string());
        }
        if climate_degraded {
            degraded.push("climate".to_string());
        }
        if yields_degraded {
            degraded.push("yields".to_string());
        }

        let portfolio =
            self.optimizer
                .optimize(&constraints, &crop_options, &market, &climate, &yields)?;

        let advisories = match climate.temperature_forecast {
            Some(forecast) => crop_options
                .iter()
                .filter_map(|crop| {
                    let stress = temperature_stress(crop, &forecast);
                    (stress > 0.0).then(|| CropAdvisory {
                        crop_name: crop.name.clone(),
                        temperature_stress: stress,
                    })
                })
                .collect(),
            None => Vec::new(),
        };

        let outcome = PlanOutcome {
            fpo_id: fpo_id.clone(),
            portfolio,
            degraded_dependencies: degraded,
            advisories,
        };

        // Persist the plan into collective context for downstream agents
        let mut slice = serde_json::Map::new();
        slice.insert("portfolio".into(), serde_json::to_value(&outcome.portfolio)?);
        slice.insert(
            "degraded_dependencies".into(),
            serde_json::to_value(&outcome.degraded_dependencies)?,
        );
        self.handle
            .update_context(&EntityId::fpo(fpo_id.as_str()), ContextSlice::Fpo, slice, None)
            .await?;

        let event = CollectiveEvent::PortfolioPlanned(outcome.clone());
        self.handle
            .broadcast(serde_json::to_value(&event)?, Some(context))
            .await?;

        Ok(outcome)
    }

    fn calculate_units(
        &self,
        member_id: &str,
        factors: &InvestmentFactors,
        weights: Option<&InvestmentWeights>,
    ) -> UnitScore {
        let score = self.calculator.calculate_units(factors, weights);
        debug!("Member {} scored {:.2} units", member_id, score.units);
        score
    }

    fn validate_factors(&self, factors: &InvestmentFactors) -> Vec<FactorViolation> {
        self.calculator.validate_factors(factors)
    }

    fn distribute_profit(
        &self,
        fpo_id: &str,
        total_profit: f64,
        members: &[MemberUnits],
        deductions: Option<&HashMap<String, f64>>,
    ) -> Vec<ProfitShare> {
        info!(
            "Distributing ₹{:.2} across {} members of {}",
            total_profit,
            members.len(),
            fpo_id
        );
        self.calculator
            .distribute_profit(total_profit, members, deductions)
    }
}

#[async_trait]
impl Agent for CollectiveAgent {
    fn role(&self) -> AgentRole {
        AgentRole::CollectiveManagement
    }

    fn capabilities(&self) -> CapabilityDeclaration {
        CapabilityDeclaration::new(self.role(), env!("CARGO_PKG_VERSION"))
            .with_capability("portfolio-optimization")
            .with_capability("investment-units")
            .with_capability("profit-distribution")
            .with_dependency(AgentRole::MarketIntelligence)
            .with_dependency(AgentRole::ClimateAdvisory)
            .with_dependency(AgentRole::GeoAgronomy)
            .with_input_hint("plan_portfolio", "constraints + crop options")
            .with_output_hint("plan_portfolio", "optimized portfolio + advisories")
    }

    async fn handle_message(&self, delivery: &Delivery) -> Result<Value> {
        if delivery.message.msg_type != MessageType::Request {
            // Events and broadcasts (including our own echoes) carry nothing
            // for us to act on
            debug!(
                "Ignoring {:?} message {}",
                delivery.message.msg_type, delivery.message.id
            );
            return Ok(Value::Null);
        }

        let request: CollectiveRequest = delivery.message.decode_payload()?;
        match request {
            CollectiveRequest::PlanPortfolio {
                fpo_id,
                constraints,
                crop_options,
            } => {
                let outcome = self
                    .plan_portfolio(
                        fpo_id,
                        constraints,
                        crop_options,
                        delivery.message.context.as_ref(),
                    )
                    .await?;
                Ok(serde_json::to_value(outcome)?)
            }
            CollectiveRequest::CalculateUnits {
                member_id,
                factors,
                weights,
            } => {
                let score = self.calculate_units(&member_id, &factors, weights.as_ref());
                Ok(serde_json::to_value(score)?)
            }
            CollectiveRequest::ValidateFactors { member_id, factors } => {
                let violations = self.validate_factors(&factors);
                debug!(
                    "Validated factors for {}: {} violations",
                    member_id,
                    violations.len()
                );
                Ok(serde_json::to_value(violations)?)
            }
            CollectiveRequest::DistributeProfit {
                fpo_id,
                total_profit,
                members,
                deductions,
            } => {
                let shares =
                    self.distribute_profit(&fpo_id, total_profit, &members, deductions.as_ref());
                Ok(serde_json::to_value(shares)?)
            }
            CollectiveRequest::SuggestWeights { profile } => {
                let weights = InvestmentUnitCalculator::suggest_weights(&profile);
                Ok(serde_json::to_value(weights)?)
            }
        }
    }
}
