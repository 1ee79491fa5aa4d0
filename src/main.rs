//! Gold Ledger - recovery & audit runner
//!
//! Restart procedure for the ledger:
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────┐    ┌──────────┐
//! │  Config  │───▶│  Store   │───▶│   Rebuild    │───▶│  Audit   │
//! │  (YAML)  │    │ (PG/mem) │    │  snapshots   │    │  (JSON)  │
//! └──────────┘    └──────────┘    └──────────────┘    └──────────┘
//! ```
//!
//! Exits non-zero when the audit finds drift or a conservation break.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use gold_ledger::config::AppConfig;
use gold_ledger::db::Database;
use gold_ledger::event_log::{InMemoryStore, LedgerStore, PgStore};
use gold_ledger::ledger::Ledger;
use gold_ledger::logging::init_logging;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

async fn open_store(app_config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match &app_config.postgres_url {
        Some(url) => {
            let db = Database::connect(url, &app_config.ledger)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.health_check().await.context("PostgreSQL health check failed")?;
            db.migrate().await.context("Failed to apply ledger schema")?;
            Ok(Arc::new(PgStore::new(
                db.pool().clone(),
                app_config.ledger.lock_wait(),
            )))
        }
        None => {
            tracing::warn!("postgres_url not set, using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&app_config);

    tracing::info!(
        git_hash = env!("GIT_HASH"),
        "Starting Gold Ledger recovery in {} mode",
        env
    );

    let store = open_store(&app_config).await?;
    let ledger = Ledger::new(store.clone(), &app_config.ledger);

    let rebuilt = ledger
        .rebuild_snapshots()
        .await
        .context("Snapshot rebuild failed")?;
    tracing::info!(accounts = rebuilt, store = store.name(), "Snapshots rebuilt");

    let report = ledger.audit().await.context("Audit failed")?;
    tracing::info!(report = %serde_json::to_string(&report)?, "Audit report");

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!(
            drifted = report.drifted.len(),
            negative = report.negative.len(),
            replay_mismatch = report.replay_mismatch.len(),
            conserved = report.is_conserved(),
            "Ledger audit failed"
        );
        Ok(ExitCode::FAILURE)
    }
}
