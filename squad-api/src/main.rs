//! Squad Entry Point
//!
//! `squad <task...>` spins up a director, lets it decompose and delegate the
//! task to specialists, prints the aggregated result and tears down every
//! sandbox it holds. State lives in memory unless `SQUAD_STORE_PATH` names a
//! SQLite file, in which case sandboxes tracked by an earlier run are
//! reattached before work starts.

use std::sync::Arc;

use squad_agents::Squad;
use squad_api::{init_tracing, ApiError, ApiResult, SquadConfig};
use squad_events::EventBus;
use squad_llm::{AnthropicClient, AnthropicRunner};
use squad_sandbox::{E2bConfig, E2bProvider, SandboxManager};
use squad_storage::{Collections, DocumentStore, InMemoryStore, SqliteStore};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let config = SquadConfig::from_env()?;
    init_tracing(config.log_format)?;

    let goal = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if goal.trim().is_empty() {
        return Err(ApiError::validation_failed("usage: squad <task>"));
    }

    let squad = build_squad(&config).await?;
    let director = squad.create_director().await?;
    info!(agent_id = %director.agent_id(), "Director ready");

    let outcome = tokio::select! {
        result = squad.orchestrate(&director, &goal) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    if outcome.is_none() {
        warn!("Interrupted, checkpointing director");
        if let Err(e) = squad.kill_agent(director.agent_id()).await {
            warn!(error = %e, "Failed to checkpoint director");
        }
    }
    release_sandboxes(&squad).await;

    match outcome {
        Some(result) => {
            let aggregated = result?;
            if aggregated.is_empty() {
                warn!("No specialist produced a result");
            }
            println!("{}", aggregated);
            Ok(())
        }
        None => Err(ApiError::internal_error("Interrupted")),
    }
}

async fn build_squad(config: &SquadConfig) -> ApiResult<Squad> {
    let store: Arc<dyn DocumentStore> = match &config.store_path {
        Some(path) => Arc::new(SqliteStore::open(path)?),
        None => Arc::new(InMemoryStore::new()),
    };
    let events = EventBus::default();

    let mut e2b = E2bConfig::new(&config.e2b_api_key);
    e2b.template = config.sandbox_template.clone();
    let sandboxes = SandboxManager::new(
        Arc::new(E2bProvider::new(e2b)),
        Collections::new(store.clone()).sandbox_tracking,
        events.clone(),
    )
    .with_defaults(config.sandbox.clone());
    let report = sandboxes.reconcile().await?;
    if report.restored > 0 || report.tombstoned > 0 {
        info!(
            restored = report.restored,
            tombstoned = report.tombstoned,
            "Reconciled tracked sandboxes"
        );
    }

    let client = AnthropicClient::new(&config.anthropic_api_key, config.requests_per_minute);
    let runner = AnthropicRunner::with_client(client, config.runner.clone());

    let squad = Squad::builder(store, Arc::new(runner))
        .with_events(events)
        .with_sandboxes(Arc::new(sandboxes))
        .with_config(config.coordination.clone())
        .build()?;
    Ok(squad)
}

async fn release_sandboxes(squad: &Squad) {
    let Some(manager) = squad.sandboxes() else {
        return;
    };
    for instance in manager.list() {
        if let Err(e) = manager.kill(instance.agent_id).await {
            warn!(sandbox_id = %instance.sandbox_id, error = %e, "Failed to release sandbox");
        }
    }
}
