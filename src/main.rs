//! Agrimesh CLI
//!
//! Runs a local mesh with stub peer agents and exercises one collective
//! planning cycle end to end, or manages the configuration file.

use agrimesh::agent::{Agent, AgentRuntime, CapabilityDeclaration, CapabilityRegistry};
use agrimesh::agents::{AgronomyRequest, ClimateRequest, CollectiveAgent, MarketRequest};
use agrimesh::bus::Delivery;
use agrimesh::planning::{
    ClimateOutlook, CropOption, MarketSnapshot, PortfolioConstraints, TempRange, YieldForecasts,
};
use agrimesh::protocol::{AgentRole, MessageContext, MessageType};
use agrimesh::{AgentHandle, CollectiveRequest, ContextStore, MeshConfig, MessageBus, PlanOutcome};
use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agrimesh", version, about = "Multi-agent advisory mesh for farmer collectives")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "AGRIMESH_CONFIG", default_value = "agrimesh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a local mesh with stub peers and one planning cycle
    Demo {
        /// Leave these dependencies unserved to exercise the fallbacks
        /// (market, climate, yields)
        #[arg(long, value_delimiter = ',')]
        degrade: Vec<String>,
    },
    /// Write a default configuration file
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Demo { degrade } => run_demo(&cli.config, &degrade).await,
        Command::InitConfig => {
            MeshConfig::default()
                .save(&cli.config)
                .context("writing default config")?;
            println!("Wrote default configuration to {}", cli.config.display());
            Ok(())
        }
    }
}

/// Market intelligence stub with canned rabi-season figures
struct StubMarketAgent;

#[async_trait]
impl Agent for StubMarketAgent {
    fn role(&self) -> AgentRole {
        AgentRole::MarketIntelligence
    }

    fn capabilities(&self) -> CapabilityDeclaration {
        CapabilityDeclaration::new(self.role(), env!("CARGO_PKG_VERSION"))
            .with_capability("market-snapshot")
    }

    async fn handle_message(&self, delivery: &Delivery) -> agrimesh::Result<Value> {
        if delivery.message.msg_type != MessageType::Request {
            return Ok(Value::Null);
        }
        let MarketRequest::MarketSnapshot { crops } = delivery.message.decode_payload()?;
        let mut snapshot = MarketSnapshot::default();
        for crop in &crops {
            let (forecast, volatility) = match crop.as_str() {
                "wheat" => (2350.0, 0.12),
                "mustard" => (5600.0, 0.18),
                "gram" => (5100.0, 0.22),
                _ => continue,
            };
            snapshot.price_forecasts.insert(crop.clone(), forecast);
            snapshot.volatility.insert(crop.clone(), volatility);
        }
        snapshot.price_history.insert(
            "wheat".into(),
            vec![2010.0, 2120.0, 2200.0, 2180.0, 2290.0],
        );
        snapshot.price_history.insert(
            "mustard".into(),
            vec![5100.0, 5350.0, 5300.0, 5480.0, 5520.0],
        );
        Ok(serde_json::to_value(snapshot)?)
    }
}

/// Climate advisory stub with a mild-winter outlook
struct StubClimateAgent;

#[async_trait]
impl Agent for StubClimateAgent {
    fn role(&self) -> AgentRole {
        AgentRole::ClimateAdvisory
    }

    fn capabilities(&self) -> CapabilityDeclaration {
        CapabilityDeclaration::new(self.role(), env!("CARGO_PKG_VERSION"))
            .with_capability("climate-outlook")
    }

    async fn handle_message(&self, delivery: &Delivery) -> agrimesh::Result<Value> {
        if delivery.message.msg_type != MessageType::Request {
            return Ok(Value::Null);
        }
        let ClimateRequest::ClimateOutlook { crops, .. } = delivery.message.decode_payload()?;
        let mut outlook = ClimateOutlook {
            temperature_forecast: Some(TempRange { min: 9.0, max: 28.0 }),
            water_availability: Some(0.8),
            ..Default::default()
        };
        for crop in &crops {
            let risk = match crop.as_str() {
                "wheat" => 0.2,
                "mustard" => 0.25,
                "gram" => 0.3,
                _ => continue,
            };
            outlook.risk_scores.insert(crop.clone(), risk);
        }
        Ok(serde_json::to_value(outlook)?)
    }
}

/// Geo-agronomy stub returning satellite-style yield forecasts
struct StubAgronomyAgent;

#[async_trait]
impl Agent for StubAgronomyAgent {
    fn role(&self) -> AgentRole {
        AgentRole::GeoAgronomy
    }

    fn capabilities(&self) -> CapabilityDeclaration {
        CapabilityDeclaration::new(self.role(), env!("CARGO_PKG_VERSION"))
            .with_capability("yield-forecasts")
    }

    async fn handle_message(&self, delivery: &Delivery) -> agrimesh::Result<Value> {
        if delivery.message.msg_type != MessageType::Request {
            return Ok(Value::Null);
        }
        let AgronomyRequest::YieldForecasts { crops } = delivery.message.decode_payload()?;
        let mut forecasts = YieldForecasts::default();
        for crop in &crops {
            let predicted = match crop.as_str() {
                "wheat" => 44.0,
                "mustard" => 13.5,
                "gram" => 11.0,
                _ => continue,
            };
            forecasts.predicted.insert(crop.clone(), predicted);
        }
        Ok(serde_json::to_value(forecasts)?)
    }
}

fn demo_crops() -> Vec<CropOption> {
    vec![
        CropOption {
            name: "wheat".into(),
            family: "poaceae".into(),
            season: "rabi".into(),
            avg_yield: 40.0,
            yield_std_dev: 6.0,
            avg_price: 2200.0,
            cultivation_cost: 36_000.0,
            water_requirement: 4500.0,
            labor_days: 45.0,
            growing_duration_days: 140,
            soil_types: vec!["loamy".into(), "clay".into()],
            min_temp: 10.0,
            max_temp: 26.0,
        },
        CropOption {
            name: "mustard".into(),
            family: "brassicaceae".into(),
            season: "rabi".into(),
            avg_yield: 12.0,
            yield_std_dev: 2.5,
            avg_price: 5400.0,
            cultivation_cost: 28_000.0,
            water_requirement: 2400.0,
            labor_days: 35.0,
            growing_duration_days: 120,
            soil_types: vec!["loamy".into(), "sandy".into()],
            min_temp: 8.0,
            max_temp: 25.0,
        },
        CropOption {
            name: "gram".into(),
            family: "fabaceae".into(),
            season: "rabi".into(),
            avg_yield: 10.0,
            yield_std_dev: 2.0,
            avg_price: 4900.0,
            cultivation_cost: 24_000.0,
            water_requirement: 2000.0,
            labor_days: 30.0,
            growing_duration_days: 110,
            soil_types: vec!["loamy".into(), "black".into()],
            min_temp: 7.0,
            max_temp: 30.0,
        },
    ]
}

async fn run_demo(config_path: &PathBuf, degrade: &[String]) -> anyhow::Result<()> {
    let config = MeshConfig::load(config_path)?;
    let store = ContextStore::new(config.context.clone());
    let bus = MessageBus::connect(config.bus.clone(), store).await?;
    let registry = CapabilityRegistry::new();

    let mut runtimes: Vec<AgentRuntime> = Vec::new();
    let peers: Vec<(&str, Arc<dyn Agent>)> = vec![
        ("market", Arc::new(StubMarketAgent)),
        ("climate", Arc::new(StubClimateAgent)),
        ("yields", Arc::new(StubAgronomyAgent)),
    ];
    for (name, peer) in peers {
        if degrade.iter().any(|d| d == name) {
            info!("Leaving {} dependency unserved to demonstrate fallback", name);
            continue;
        }
        let mut runtime = AgentRuntime::new(peer, bus.clone()).with_registry(registry.clone());
        runtime.start().await?;
        runtimes.push(runtime);
    }

    let collective = CollectiveAgent::new(
        bus.clone(),
        config.planning.clone(),
        config.investment.clone(),
    );
    let mut collective_runtime =
        AgentRuntime::new(Arc::new(collective), bus.clone()).with_registry(registry.clone());
    collective_runtime.start().await?;
    runtimes.push(collective_runtime);

    // Issue the plan request the way the human-interface agent would
    let ui = AgentHandle::new(AgentRole::HumanInterface, bus.clone());
    let request = CollectiveRequest::PlanPortfolio {
        fpo_id: "fpo-demo".into(),
        constraints: PortfolioConstraints {
            total_land: 10.0,
            total_water: 100_000.0,
            total_labor: 500.0,
            total_budget: 500_000.0,
            min_crop_diversity: 2,
        },
        crop_options: demo_crops(),
    };
    let reply = ui
        .request_from_agent(
            AgentRole::CollectiveManagement,
            serde_json::to_value(&request)?,
            Some(MessageContext::for_fpo("fpo-demo")),
            Some(Duration::from_secs(30)),
        )
        .await?;
    let outcome: PlanOutcome = serde_json::from_value(reply)?;

    println!("\nPortfolio plan for {}", outcome.fpo_id);
    println!(
        "  expected return {:.1}%, risk {:.1}%, sharpe {:.2}, diversification {:.2}",
        outcome.portfolio.expected_return * 100.0,
        outcome.portfolio.portfolio_risk * 100.0,
        outcome.portfolio.sharpe_ratio,
        outcome.portfolio.diversification_index,
    );
    for allocation in &outcome.portfolio.allocations {
        println!(
            "  {:<10} {:>5.2} ha  return {:>6.1}%  risk {:.2}",
            allocation.crop_name,
            allocation.land_area,
            allocation.expected_return * 100.0,
            allocation.risk,
        );
    }
    println!(
        "  utilization: land {:.0}%, water {:.0}%, labor {:.0}%, budget {:.0}%",
        outcome.portfolio.utilization.land_pct,
        outcome.portfolio.utilization.water_pct,
        outcome.portfolio.utilization.labor_pct,
        outcome.portfolio.utilization.budget_pct,
    );
    if !outcome.degraded_dependencies.is_empty() {
        println!(
            "  degraded dependencies: {}",
            outcome.degraded_dependencies.join(", ")
        );
    }
    for advisory in &outcome.advisories {
        println!(
            "  advisory: {} temperature stress {:.2}",
            advisory.crop_name, advisory.temperature_stress
        );
    }

    for mut runtime in runtimes {
        runtime.stop().await;
    }
    bus.close().await;
    Ok(())
}
