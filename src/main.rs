use std::path::{Path, PathBuf};
use std::sync::Arc;

use quarterback::completion::OpenAiClient;
use quarterback::db::Database;
use quarterback::http::{router, AppState};
use quarterback::logging::{cleanup_old_logs, init_logging, log_conversation, log_error};
use quarterback::sheets::SheetsClient;
use quarterback::storage::UploadStore;
use quarterback::webhook::WebhookClient;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;
    match cleanup_old_logs() {
        Ok(deleted) if deleted > 0 => {
            log_conversation(None, &format!("Removed {} old log files", deleted))
        }
        Ok(_) => {}
        Err(e) => log_error(None, &format!("Log cleanup failed: {}", e)),
    }

    let db_path = env_or("QUARTERBACK_DB_PATH", "./data/quarterback.db");
    let data_dir = PathBuf::from(env_or("QUARTERBACK_DATA_DIR", "./data/uploads"));
    let bind = env_or("QUARTERBACK_BIND", "127.0.0.1:8080");

    let db = Arc::new(Database::open(Path::new(&db_path))?);

    let state = AppState {
        db,
        completion: Arc::new(OpenAiClient::new(env_opt("OPENAI_API_KEY"))),
        sheets: SheetsClient::new(env_opt("GOOGLE_SHEETS_API_KEY")),
        webhooks: WebhookClient::new(env_opt("N8N_WEBHOOK_URL")),
        storage: UploadStore::new(data_dir),
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    log_conversation(None, &format!("Quarterback listening on {}", bind));
    axum::serve(listener, app).await?;

    Ok(())
}
