use resolve_automation::{Config, Stores, TriggerEvent, WorkflowService, database};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = database::create_pool(&config.database_url).await?;
    database::migrate(&pool).await?;

    let service = WorkflowService::new(Stores::postgres(pool), config.automation.clone());
    info!(
        "Workflow automation ready (action timeout {}s), reading trigger events from stdin",
        config.automation.action_timeout.as_secs()
    );

    // One JSON trigger event per line: {"trigger": "LEAD_CREATED", "payload": {...}}
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: TriggerEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed trigger event: {}", e);
                continue;
            }
        };

        match service.dispatch(event.trigger, &event.payload).await {
            Ok(outcomes) => {
                for outcome in outcomes {
                    match &outcome.result {
                        Ok(result) => info!(
                            "Event {}: workflow {} -> {} (execution {})",
                            event.event_id,
                            outcome.workflow_id,
                            result.status(),
                            result.execution_id()
                        ),
                        Err(e) => error!(
                            "Event {}: workflow {} failed: {}",
                            event.event_id, outcome.workflow_id, e
                        ),
                    }
                }
            }
            Err(e) => error!("Event {}: dispatch failed: {}", event.event_id, e),
        }
    }

    info!("Trigger stream closed, shutting down");
    Ok(())
}
