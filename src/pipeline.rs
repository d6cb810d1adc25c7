//! Conversation and enrichment pipelines
//!
//! `ChatSession` drives a conversation with a persona: it opens the
//! conversation with a synthetic greeting (never persisted), then runs
//! turns that persist the user message, assemble context from the last 10
//! messages, call the completion backend, and persist the reply.

use serde::Deserialize;
use std::sync::Arc;

use crate::completion::CompletionBackend;
use crate::context::{build_enrichment_prompt, build_persona_context, ENRICHMENT_SYSTEM_PROMPT};
use crate::db::{Database, Persona};
use crate::error::{AppError, Result};
use crate::logging::{log_conversation, log_enrich, log_query};

/// Messages of prior conversation included in each turn's context
const CONTEXT_WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq)]
enum SessionState {
    Uninitialized,
    Active { conversation_id: String },
}

pub struct ChatSession {
    db: Arc<Database>,
    backend: Arc<dyn CompletionBackend>,
    persona_id: String,
    state: SessionState,
}

#[derive(Debug)]
pub struct TurnOutcome {
    pub response: String,
    pub persona_name: String,
    pub conversation_id: String,
}

impl ChatSession {
    pub fn new(db: Arc<Database>, backend: Arc<dyn CompletionBackend>, persona_id: String) -> Self {
        ChatSession {
            db,
            backend,
            persona_id,
            state: SessionState::Uninitialized,
        }
    }

    /// Resume an existing conversation instead of opening a new one
    pub fn resume(
        db: Arc<Database>,
        backend: Arc<dyn CompletionBackend>,
        persona_id: String,
        conversation_id: String,
    ) -> Self {
        ChatSession {
            db,
            backend,
            persona_id,
            state: SessionState::Active { conversation_id },
        }
    }

    fn persona(&self) -> Result<Persona> {
        self.db
            .get_persona(&self.persona_id)?
            .ok_or_else(|| AppError::not_found("Persona not found"))
    }

    /// Open the conversation and return its id with the greeting. The
    /// greeting is synthetic and not stored as a message.
    pub fn start(&mut self) -> Result<(String, String)> {
        let persona = self.persona()?;
        let conversation = self
            .db
            .create_conversation(&persona.id, &format!("Chat with {}", persona.name))?;

        log_conversation(
            Some(&persona.id),
            &format!("Started conversation {}", conversation.id),
        );

        let greeting = greeting_for(&persona.name);
        self.state = SessionState::Active {
            conversation_id: conversation.id.clone(),
        };
        Ok((conversation.id, greeting))
    }

    /// Run one chat turn. A blank query is rejected before anything is
    /// persisted; a completion failure leaves the stored user message in
    /// place and surfaces the upstream error.
    pub async fn run_turn(&mut self, query: &str) -> Result<TurnOutcome> {
        if query.trim().is_empty() {
            return Err(AppError::validation("Missing required fields: personaId and query"));
        }

        let persona = self.persona()?;

        let conversation_id = match &self.state {
            SessionState::Active { conversation_id } => conversation_id.clone(),
            SessionState::Uninitialized => self.start()?.0,
        };

        self.db.insert_message(&conversation_id, "user", query)?;

        let history = self.db.get_recent_messages(&conversation_id, CONTEXT_WINDOW)?;
        let context = build_persona_context(&persona, &history);

        log_query(
            Some(&persona.id),
            &format!("Running turn with {} prior messages", history.len()),
        );

        let response = self.backend.complete(&context, query).await?;
        self.db.insert_message(&conversation_id, "assistant", &response)?;

        Ok(TurnOutcome {
            response,
            persona_name: persona.name,
            conversation_id,
        })
    }

}

/// Synthetic assistant opener shown when a conversation starts
pub fn greeting_for(persona_name: &str) -> String {
    format!(
        "I am the {} persona. I've been created from the audience data you provided. \
         I'll answer all your questions from the perspective of this audience segment. \
         Let me know what you'd like to explore about this audience.",
        persona_name
    )
}

#[derive(Debug, Deserialize)]
struct EnrichmentResult {
    name: Option<String>,
    demographics: Option<serde_json::Value>,
    characteristics: Option<Vec<String>>,
}

/// Enrich a persona: build the profile prompt from its raw data, ask the
/// backend for the six-key JSON object, and write the result back.
pub async fn enrich_persona(
    db: &Database,
    backend: &dyn CompletionBackend,
    persona_id: &str,
) -> Result<serde_json::Value> {
    let persona = db
        .get_persona(persona_id)?
        .ok_or_else(|| AppError::not_found("Persona not found"))?;

    let prompt = build_enrichment_prompt(&persona.raw_data);
    log_enrich(Some(persona_id), "Requesting persona enrichment");

    let raw_response = backend.complete_json(ENRICHMENT_SYSTEM_PROMPT, &prompt).await?;

    // Some models wrap JSON output in a markdown fence
    let cleaned = raw_response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let enriched_data: serde_json::Value = serde_json::from_str(cleaned)
        .map_err(|e| AppError::upstream("OpenAI", format!("invalid enrichment JSON: {}", e)))?;
    let parsed: EnrichmentResult = serde_json::from_value(enriched_data.clone())
        .map_err(|e| AppError::upstream("OpenAI", format!("invalid enrichment JSON: {}", e)))?;

    let name = parsed.name.unwrap_or_else(|| persona.name.clone());
    let summary = parsed
        .characteristics
        .filter(|c| !c.is_empty())
        .map(|c| c.join(" "))
        .unwrap_or_else(|| "Persona enriched".to_string());

    db.update_persona_enrichment(
        persona_id,
        &name,
        &enriched_data,
        &summary,
        parsed.demographics.as_ref(),
    )?;

    log_enrich(Some(persona_id), &format!("Enriched persona as \"{}\"", name));
    Ok(enriched_data)
}
