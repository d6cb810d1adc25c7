//! HTTP surface
//!
//! Thin axum handlers over the library modules. All shared state travels
//! through `AppState`; webhook notifications are spawned so they never
//! delay a response.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::completion::CompletionBackend;
use crate::db::{Database, DEFAULT_PROJECT_ID};
use crate::error::{AppError, Result};
use crate::logging::{log_sheets, log_upload};
use crate::normalizer::{normalize_csv, sheet_to_records};
use crate::pipeline::{enrich_persona, greeting_for, ChatSession};
use crate::sheets::SheetsClient;
use crate::storage::UploadStore;
use crate::webhook::{WebhookClient, WebhookEvent};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub completion: Arc<dyn CompletionBackend>,
    pub sheets: SheetsClient,
    pub webhooks: WebhookClient,
    pub storage: UploadStore,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/personas", get(list_personas).post(create_persona))
        .route("/personas/:id", delete(delete_persona))
        .route("/personas/:id/enrich", post(enrich))
        .route("/conversations", post(create_conversation))
        .route("/query", post(query_persona))
        .route("/sheets/import", get(sheets_status).post(sheets_import))
        .route("/webhooks/test", post(test_webhook))
        .with_state(state)
}

fn notify_off_path(
    webhooks: &WebhookClient,
    event: WebhookEvent,
    persona_id: String,
    project_id: String,
    metadata: serde_json::Value,
) {
    let webhooks = webhooks.clone();
    tokio::spawn(async move {
        webhooks
            .notify(event, &persona_id, Some(&project_id), metadata)
            .await;
    });
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_personas(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let personas = state.db.list_personas()?;
    Ok(Json(json!({ "personas": personas })))
}

#[derive(Debug, Deserialize)]
struct CreatePersonaRequest {
    #[serde(rename = "projectId")]
    project_id: Option<String>,
    #[serde(rename = "fileName")]
    file_name: String,
    #[serde(rename = "fileContent")]
    file_content: String,
}

async fn create_persona(
    State(state): State<AppState>,
    Json(body): Json<CreatePersonaRequest>,
) -> Result<Json<serde_json::Value>> {
    if body.file_name.trim().is_empty() || body.file_content.is_empty() {
        return Err(AppError::validation("Missing required fields: fileName and fileContent"));
    }

    let bytes = BASE64
        .decode(body.file_content.as_bytes())
        .map_err(|_| AppError::validation("fileContent is not valid base64"))?;
    let text = String::from_utf8(bytes.clone())
        .map_err(|_| AppError::validation("fileContent is not valid UTF-8 CSV"))?;

    let project_id = body
        .project_id
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string());

    let storage_key = state.storage.store(&project_id, &body.file_name, &bytes)?;
    let records = normalize_csv(&text, &body.file_name);
    let data_points = records.len();

    let persona = state.db.create_persona(
        &project_id,
        &format!("Persona from {}", body.file_name),
        Some(&storage_key),
        &serde_json::to_value(&records)?,
        Some("Processing persona data..."),
        None,
    )?;

    log_upload(
        Some(&persona.id),
        &format!("Created persona from {} ({} data points)", body.file_name, data_points),
    );

    notify_off_path(
        &state.webhooks,
        WebhookEvent::PersonaCreated,
        persona.id.clone(),
        project_id,
        json!({ "fileName": body.file_name, "dataPoints": data_points }),
    );

    Ok(Json(json!({
        "id": persona.id,
        "name": persona.name,
        "dataPoints": data_points,
    })))
}

async fn delete_persona(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if id.trim().is_empty() {
        return Err(AppError::validation("Persona ID is required"));
    }
    if !state.db.delete_persona(&id)? {
        return Err(AppError::not_found("Persona not found"));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Persona deleted successfully",
    })))
}

async fn enrich(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let enriched_data = enrich_persona(&state.db, state.completion.as_ref(), &id).await?;

    let project_id = state
        .db
        .get_persona(&id)?
        .map(|p| p.project_id)
        .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string());

    notify_off_path(
        &state.webhooks,
        WebhookEvent::PersonaEnriched,
        id,
        project_id,
        json!({ "name": enriched_data.get("name") }),
    );

    Ok(Json(json!({ "success": true, "enrichedData": enriched_data })))
}

#[derive(Debug, Deserialize)]
struct CreateConversationRequest {
    #[serde(rename = "personaId")]
    persona_id: String,
}

async fn create_conversation(
    State(state): State<AppState>,
    Json(body): Json<CreateConversationRequest>,
) -> Result<Json<serde_json::Value>> {
    if body.persona_id.trim().is_empty() {
        return Err(AppError::validation("Missing required field: personaId"));
    }

    let mut session = ChatSession::new(state.db.clone(), state.completion.clone(), body.persona_id);
    let (conversation_id, greeting) = session.start()?;

    Ok(Json(json!({
        "conversationId": conversation_id,
        "greeting": greeting,
    })))
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(rename = "personaId")]
    persona_id: Option<String>,
    #[serde(rename = "conversationId")]
    conversation_id: Option<String>,
    query: Option<String>,
}

async fn query_persona(
    State(state): State<AppState>,
    Json(body): Json<QueryRequest>,
) -> Result<Json<serde_json::Value>> {
    let persona_id = body.persona_id.filter(|p| !p.trim().is_empty());
    let query = body.query.filter(|q| !q.trim().is_empty());
    let (persona_id, query) = match (persona_id, query) {
        (Some(p), Some(q)) => (p, q),
        _ => return Err(AppError::validation("Missing required fields: personaId and query")),
    };

    // Resume the conversation when the caller names an existing one
    let mut session = match &body.conversation_id {
        Some(id) if state.db.get_conversation(id)?.is_some() => ChatSession::resume(
            state.db.clone(),
            state.completion.clone(),
            persona_id.clone(),
            id.clone(),
        ),
        _ => ChatSession::new(state.db.clone(), state.completion.clone(), persona_id.clone()),
    };

    let outcome = session.run_turn(&query).await?;

    let project_id = state
        .db
        .get_persona(&persona_id)?
        .map(|p| p.project_id)
        .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string());

    notify_off_path(
        &state.webhooks,
        WebhookEvent::QueryCompleted,
        persona_id,
        project_id,
        json!({ "query": query }),
    );

    Ok(Json(json!({
        "success": true,
        "response": outcome.response,
        "personaName": outcome.persona_name,
        "conversationId": outcome.conversation_id,
    })))
}

#[derive(Debug, Deserialize)]
struct SheetsStatusQuery {
    test: Option<String>,
}

async fn sheets_status(
    State(state): State<AppState>,
    Query(params): Query<SheetsStatusQuery>,
) -> Result<Json<serde_json::Value>> {
    if params.test.is_some() {
        let result = state.sheets.test_connection().await;
        return Ok(Json(serde_json::to_value(result)?));
    }

    let personas = state.sheets.get_persona_data(None).await;
    let available: Vec<serde_json::Value> = personas
        .iter()
        .map(|p| {
            let records = sheet_to_records(p);
            json!({
                "name": p.name,
                "percentage": p.percentage,
                "summary": p.summary,
                "dataPoints": records.len(),
            })
        })
        .collect();

    Ok(Json(json!({
        "availablePersonas": available,
        "sheetsConfigured": state.sheets.is_configured(),
    })))
}

#[derive(Debug, Deserialize)]
struct SheetsImportRequest {
    #[serde(rename = "personaName")]
    persona_name: String,
    #[serde(rename = "projectId")]
    project_id: Option<String>,
}

async fn sheets_import(
    State(state): State<AppState>,
    Json(body): Json<SheetsImportRequest>,
) -> Result<Json<serde_json::Value>> {
    if body.persona_name.trim().is_empty() {
        return Err(AppError::validation("Missing required field: personaName"));
    }

    let matches = state.sheets.get_persona_data(Some(&body.persona_name)).await;
    let sheet_persona = matches
        .into_iter()
        .next()
        .ok_or_else(|| AppError::not_found("No matching persona found in sheet"))?;

    let records = sheet_to_records(&sheet_persona);
    let demographics = json!({
        "percentage": sheet_persona.percentage,
        "genderSplit": sheet_persona.gender_split,
        "devicePreference": sheet_persona.device_preference,
    });

    let project_id = body
        .project_id
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string());

    let persona = state.db.create_persona(
        &project_id,
        &sheet_persona.name,
        None,
        &serde_json::to_value(&records)?,
        Some(&sheet_persona.summary),
        Some(&demographics),
    )?;

    log_sheets(
        Some(&persona.id),
        &format!("Imported \"{}\" ({} data points)", sheet_persona.name, records.len()),
    );

    notify_off_path(
        &state.webhooks,
        WebhookEvent::PersonaCreated,
        persona.id.clone(),
        project_id,
        json!({ "source": "google_sheets", "dataPoints": records.len() }),
    );

    Ok(Json(json!({
        "id": persona.id,
        "name": persona.name,
        "dataPoints": records.len(),
        "percentage": sheet_persona.percentage,
        "greeting": greeting_for(&persona.name),
    })))
}

async fn test_webhook(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (success, message) = state.webhooks.test_webhook().await;
    Json(json!({ "success": success, "message": message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionBackend;
    use async_trait::async_trait;

    struct EchoBackend;

    #[async_trait]
    impl CompletionBackend for EchoBackend {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            Ok(format!("echo: {}", user))
        }

        async fn complete_json(&self, _system: &str, _user: &str) -> Result<String> {
            Ok(r#"{"name": "Enriched", "characteristics": ["Focused."]}"#.to_string())
        }
    }

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        AppState {
            db: Arc::new(Database::open_in_memory().unwrap()),
            completion: Arc::new(EchoBackend),
            sheets: SheetsClient::new(None),
            webhooks: WebhookClient::new(None),
            storage: UploadStore::new(dir.path().to_path_buf()),
        }
    }

    fn upload_request(csv: &str) -> CreatePersonaRequest {
        CreatePersonaRequest {
            project_id: None,
            file_name: "audience.csv".to_string(),
            file_content: BASE64.encode(csv),
        }
    }

    #[tokio::test]
    async fn test_upload_creates_persona_with_data_points() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let csv = "Category,Type,Value,Source\nSocial Media,Preference,LinkedIn,survey\nLocations,Preference,London,survey";
        let Json(response) = create_persona(State(state.clone()), Json(upload_request(csv)))
            .await
            .unwrap();

        assert_eq!(response["name"], "Persona from audience.csv");
        assert_eq!(response["dataPoints"], 2);

        let id = response["id"].as_str().unwrap();
        let persona = state.db.get_persona(id).unwrap().unwrap();
        assert_eq!(persona.summary.as_deref(), Some("Processing persona data..."));
        assert!(persona.csv_file_path.unwrap().ends_with("-audience.csv"));
    }

    /// One-shot HTTP server that answers every request with 500
    async fn failing_sink() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                use tokio::io::{AsyncReadExt, AsyncWriteExt};
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_upload_succeeds_when_webhook_delivery_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sink_url = failing_sink().await;
        let webhooks = WebhookClient::new(Some(sink_url.clone()));
        assert!(
            !webhooks
                .notify(WebhookEvent::PersonaCreated, "p-1", None, json!({}))
                .await
        );

        let sink_url = failing_sink().await;
        let mut state = test_state(&dir);
        state.webhooks = WebhookClient::new(Some(sink_url));

        let csv = "Category,Type,Value,Source\nInsights,Preference,Curious,survey";
        let Json(response) = create_persona(State(state.clone()), Json(upload_request(csv)))
            .await
            .unwrap();

        assert_eq!(response["name"], "Persona from audience.csv");
        assert_eq!(response["dataPoints"], 1);
        assert!(state
            .db
            .get_persona(response["id"].as_str().unwrap())
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_base64() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let request = CreatePersonaRequest {
            project_id: None,
            file_name: "audience.csv".to_string(),
            file_content: "not base64!!!".to_string(),
        };
        let err = create_persona(State(state), Json(request)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_persona_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let err = delete_persona(State(state), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_query_requires_persona_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let request = QueryRequest {
            persona_id: None,
            conversation_id: None,
            query: Some("hello".to_string()),
        };
        let err = query_persona(State(state), Json(request)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_query_roundtrip_with_new_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let csv = "Category,Type,Value,Source\nInsights,Preference,Curious,survey";
        let Json(created) = create_persona(State(state.clone()), Json(upload_request(csv)))
            .await
            .unwrap();
        let persona_id = created["id"].as_str().unwrap().to_string();

        let request = QueryRequest {
            persona_id: Some(persona_id),
            conversation_id: None,
            query: Some("What are you curious about?".to_string()),
        };
        let Json(response) = query_persona(State(state.clone()), Json(request)).await.unwrap();

        assert_eq!(response["success"], true);
        assert_eq!(response["response"], "echo: What are you curious about?");
        assert_eq!(response["personaName"], "Persona from audience.csv");

        let conversation_id = response["conversationId"].as_str().unwrap();
        assert_eq!(state.db.count_messages(conversation_id).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sheets_import_creates_persona_from_example_data() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let request = SheetsImportRequest {
            persona_name: "Informed".to_string(),
            project_id: None,
        };
        let Json(response) = sheets_import(State(state.clone()), Json(request)).await.unwrap();

        assert_eq!(response["name"], "Informed Professionals");
        assert_eq!(response["percentage"], "14%");

        let id = response["id"].as_str().unwrap();
        let persona = state.db.get_persona(id).unwrap().unwrap();
        assert_eq!(
            persona.demographics.as_ref().unwrap()["genderSplit"],
            "75% Male"
        );
        assert!(persona.raw_data.as_array().unwrap().len() > 2);
    }

    #[tokio::test]
    async fn test_sheets_import_unknown_name_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let request = SheetsImportRequest {
            persona_name: "nobody".to_string(),
            project_id: None,
        };
        let err = sheets_import(State(state), Json(request)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
