use risk_agent_orchestrator::{
    audit::build_event_sink,
    config::{init_tracing, Settings},
    gemini::GeminiProvider,
    models::RunStatus,
    report::FileReportStore,
    workflow::WorkflowManager,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let settings = Arc::new(Settings::from_env()?);
    init_tracing(&settings.log_level);

    info!(
        env = %settings.app_env,
        model = %settings.model_name,
        "Risk Agent Orchestrator starting"
    );

    let events = build_event_sink(&settings);
    let manager = WorkflowManager::new(
        settings.clone(),
        Arc::new(GeminiProvider::new(settings.clone())),
        events,
    )
    .with_report_store(Arc::new(FileReportStore::from_settings(&settings)));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let run = manager.run_workflow(&cancel).await;

    println!("{}", serde_json::to_string_pretty(&run.result())?);

    match run.status {
        RunStatus::Success => Ok(()),
        _ => Err(run
            .error
            .unwrap_or_else(|| "workflow did not complete".to_string())
            .into()),
    }
}
