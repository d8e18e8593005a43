use risk_agent_orchestrator::{
    api::start_server,
    audit::build_event_sink,
    config::{init_tracing, Settings},
    gemini::GeminiProvider,
    report::FileReportStore,
    workflow::WorkflowManager,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let settings = Arc::new(Settings::from_env()?);
    init_tracing(&settings.log_level);

    if settings.api_key.is_none() {
        warn!("GEMINI_API_KEY not set; workflow runs will fail at setup");
    }
    if settings.postgres_url().is_none() {
        warn!("No Postgres URL configured; thinking events stay in memory");
    }

    info!("🚀 Risk Agent Orchestrator - API Server");
    info!("📍 Port: {}", settings.port);

    let manager = Arc::new(
        WorkflowManager::new(
            settings.clone(),
            Arc::new(GeminiProvider::new(settings.clone())),
            build_event_sink(&settings),
        )
        .with_report_store(Arc::new(FileReportStore::from_settings(&settings))),
    );

    info!("📡 Starting API server...");
    start_server(manager, settings.port).await?;

    Ok(())
}
