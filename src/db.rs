//! SQLite persistence for Quarterback
//!
//! Holds clients, projects, personas, conversations, and messages. The
//! database handle is owned by `AppState` and passed down explicitly.
//! Cascade deletes are explicit: removing a persona removes its
//! conversations and their messages in the same transaction scope.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;

/// Default client seeded at startup so uploads work without account setup
pub const DEFAULT_CLIENT_ID: &str = "11111111-1111-1111-1111-111111111111";
/// Default project under the default client
pub const DEFAULT_PROJECT_ID: &str = "22222222-2222-2222-2222-222222222222";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Persona {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub csv_file_path: Option<String>,
    pub raw_data: serde_json::Value,
    pub enriched_data: Option<serde_json::Value>,
    pub summary: Option<String>,
    pub demographics: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersonaSummary {
    pub id: String,
    pub name: String,
    pub project_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    pub id: String,
    pub persona_id: String,
    pub title: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let conn = Connection::open(path)?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| {
            rusqlite::Error::InvalidQuery
        })?;
        Ok(f(&conn)?)
    }

    fn init_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS clients (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS projects (
                    id TEXT PRIMARY KEY,
                    client_id TEXT NOT NULL REFERENCES clients(id),
                    name TEXT NOT NULL,
                    description TEXT,
                    status TEXT NOT NULL DEFAULT 'active',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS personas (
                    id TEXT PRIMARY KEY,
                    project_id TEXT NOT NULL REFERENCES projects(id),
                    name TEXT NOT NULL,
                    csv_file_path TEXT,
                    raw_data TEXT NOT NULL DEFAULT '[]',
                    enriched_data TEXT,
                    summary TEXT,
                    demographics TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS conversations (
                    id TEXT PRIMARY KEY,
                    persona_id TEXT NOT NULL REFERENCES personas(id),
                    title TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS messages (
                    id TEXT PRIMARY KEY,
                    conversation_id TEXT NOT NULL REFERENCES conversations(id),
                    role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_personas_project ON personas(project_id);
                CREATE INDEX IF NOT EXISTS idx_conversations_persona ON conversations(persona_id);
                CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);",
            )?;

            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT OR IGNORE INTO clients (id, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![DEFAULT_CLIENT_ID, "Default Client", now],
            )?;
            conn.execute(
                "INSERT OR IGNORE INTO projects (id, client_id, name, description, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?5)",
                params![
                    DEFAULT_PROJECT_ID,
                    DEFAULT_CLIENT_ID,
                    "Default Project",
                    "Default project for persona uploads",
                    now
                ],
            )?;
            Ok(())
        })
    }

    pub fn create_persona(
        &self,
        project_id: &str,
        name: &str,
        csv_file_path: Option<&str>,
        raw_data: &serde_json::Value,
        summary: Option<&str>,
        demographics: Option<&serde_json::Value>,
    ) -> Result<Persona> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let raw_json = raw_data.to_string();
        let demographics_json = demographics.map(|d| d.to_string());

        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO personas (id, project_id, name, csv_file_path, raw_data, summary, demographics, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![id, project_id, name, csv_file_path, raw_json, summary, demographics_json, now],
            )?;
            Ok(())
        })?;

        Ok(Persona {
            id,
            project_id: project_id.to_string(),
            name: name.to_string(),
            csv_file_path: csv_file_path.map(String::from),
            raw_data: raw_data.clone(),
            enriched_data: None,
            summary: summary.map(String::from),
            demographics: demographics.cloned(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn get_persona(&self, id: &str) -> Result<Option<Persona>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, project_id, name, csv_file_path, raw_data, enriched_data, summary, demographics, created_at, updated_at
                 FROM personas WHERE id = ?1",
                params![id],
                row_to_persona,
            )
            .optional()
        })
    }

    /// List the 10 most recent personas
    pub fn list_personas(&self) -> Result<Vec<PersonaSummary>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, project_id FROM personas
                 ORDER BY created_at DESC, rowid DESC LIMIT 10",
            )?;
            let personas = stmt
                .query_map([], |row| {
                    Ok(PersonaSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        project_id: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(personas)
        })
    }

    pub fn update_persona_enrichment(
        &self,
        id: &str,
        name: &str,
        enriched_data: &serde_json::Value,
        summary: &str,
        demographics: Option<&serde_json::Value>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let enriched_json = enriched_data.to_string();
        let demographics_json = demographics.map(|d| d.to_string());

        self.with_connection(|conn| {
            conn.execute(
                "UPDATE personas SET name = ?1, enriched_data = ?2, summary = ?3, demographics = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![name, enriched_json, summary, demographics_json, now, id],
            )?;
            Ok(())
        })
    }

    /// Delete a persona and everything hanging off it. Returns false when
    /// the persona did not exist.
    pub fn delete_persona(&self, id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM messages WHERE conversation_id IN
                 (SELECT id FROM conversations WHERE persona_id = ?1)",
                params![id],
            )?;
            conn.execute("DELETE FROM conversations WHERE persona_id = ?1", params![id])?;
            let deleted = conn.execute("DELETE FROM personas WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
    }

    pub fn create_conversation(&self, persona_id: &str, title: &str) -> Result<Conversation> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, persona_id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id, persona_id, title, now],
            )?;
            Ok(())
        })?;

        Ok(Conversation {
            id,
            persona_id: persona_id.to_string(),
            title: title.to_string(),
            created_at: now,
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, persona_id, title, created_at FROM conversations WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Conversation {
                        id: row.get(0)?,
                        persona_id: row.get(1)?,
                        title: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn insert_message(&self, conversation_id: &str, role: &str, content: &str) -> Result<Message> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, conversation_id, role, content, now],
            )?;
            conn.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![now, conversation_id],
            )?;
            Ok(())
        })?;

        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Get the most recent messages for a conversation, oldest first
    pub fn get_recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, created_at FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )?;
            let mut messages = stmt
                .query_map(params![conversation_id, limit as i64], |row| {
                    Ok(Message {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        role: row.get(2)?,
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            messages.reverse();
            Ok(messages)
        })
    }

    pub fn count_messages(&self, conversation_id: &str) -> Result<i64> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
        })
    }
}

fn row_to_persona(row: &rusqlite::Row) -> rusqlite::Result<Persona> {
    let raw_json: String = row.get(4)?;
    let enriched_json: Option<String> = row.get(5)?;
    let demographics_json: Option<String> = row.get(7)?;

    Ok(Persona {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        csv_file_path: row.get(3)?,
        raw_data: serde_json::from_str(&raw_json).unwrap_or(serde_json::Value::Array(vec![])),
        enriched_data: enriched_json.and_then(|s| serde_json::from_str(&s).ok()),
        summary: row.get(6)?,
        demographics: demographics_json.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_persona(db: &Database) -> Persona {
        db.create_persona(
            DEFAULT_PROJECT_ID,
            "Test Persona",
            None,
            &serde_json::json!([]),
            Some("Processing persona data..."),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_persona_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let raw = serde_json::json!([
            {"Category": "Social Media", "Type": "Preference", "Value": "Instagram", "Source": "test.csv"}
        ]);
        let created = db
            .create_persona(DEFAULT_PROJECT_ID, "Roundtrip", Some("p/key.csv"), &raw, None, None)
            .unwrap();

        let fetched = db.get_persona(&created.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Roundtrip");
        assert_eq!(fetched.csv_file_path.as_deref(), Some("p/key.csv"));
        assert_eq!(fetched.raw_data, raw);
        assert!(fetched.enriched_data.is_none());
    }

    #[test]
    fn test_delete_persona_cascades() {
        let db = Database::open_in_memory().unwrap();
        let persona = test_persona(&db);
        let conversation = db
            .create_conversation(&persona.id, "Chat with Test Persona")
            .unwrap();
        db.insert_message(&conversation.id, "user", "hello").unwrap();
        db.insert_message(&conversation.id, "assistant", "hi there").unwrap();

        assert!(db.delete_persona(&persona.id).unwrap());
        assert!(db.get_persona(&persona.id).unwrap().is_none());
        assert!(db.get_conversation(&conversation.id).unwrap().is_none());
        assert_eq!(db.count_messages(&conversation.id).unwrap(), 0);
    }

    #[test]
    fn test_delete_missing_persona_returns_false() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.delete_persona("does-not-exist").unwrap());
    }

    #[test]
    fn test_recent_messages_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        let persona = test_persona(&db);
        let conversation = db.create_conversation(&persona.id, "ordering").unwrap();

        for i in 0..15 {
            db.insert_message(&conversation.id, "user", &format!("message {}", i))
                .unwrap();
        }

        let messages = db.get_recent_messages(&conversation.id, 10).unwrap();
        assert_eq!(messages.len(), 10);
        assert_eq!(messages[0].content, "message 5");
        assert_eq!(messages[9].content, "message 14");
    }

    #[test]
    fn test_list_personas_limit_and_order() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..12 {
            db.create_persona(
                DEFAULT_PROJECT_ID,
                &format!("Persona {}", i),
                None,
                &serde_json::json!([]),
                None,
                None,
            )
            .unwrap();
        }

        let personas = db.list_personas().unwrap();
        assert_eq!(personas.len(), 10);
        assert_eq!(personas[0].name, "Persona 11");
    }
}
