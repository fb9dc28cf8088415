//! History Service
//!
//! Records every execution: what was sent, what came back, and how it ended.

use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::models::history::{HistoryEntry, HistoryFilter, NewHistoryEntry, RequestPayload};
use crate::storage::database::DbPool;
use crate::storage::Database;
use crate::utils::error::{AppError, AppResult};

/// Entries returned when a filter sets no limit
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

const HISTORY_COLUMNS: &str = "id, prompt_id, backend, model, request_payload, response_text,
    status, error, duration_ms, created_at";

/// Service for the execution history
pub struct HistoryService {
    pool: DbPool,
}

impl HistoryService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn from_database(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Append an entry
    pub fn record(&self, entry: NewHistoryEntry) -> AppResult<HistoryEntry> {
        let id = Uuid::new_v4().to_string();
        let payload_json = serde_json::to_string(&entry.request_payload)?;

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO history (id, prompt_id, backend, model, request_payload, response_text, status, error, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                id,
                entry.prompt_id,
                entry.backend,
                entry.model,
                payload_json,
                entry.response_text,
                entry.status.to_string(),
                entry.error,
                entry.duration_ms as i64,
            ],
        )?;
        drop(conn);

        self.get(&id)?
            .ok_or_else(|| AppError::database("Failed to retrieve recorded history entry"))
    }

    /// Most recent entries first
    pub fn list(&self, filter: &HistoryFilter) -> AppResult<Vec<HistoryEntry>> {
        let conn = self.pool.get()?;

        let mut sql = format!("SELECT {} FROM history WHERE 1=1", HISTORY_COLUMNS);
        let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(prompt_id) = &filter.prompt_id {
            sql.push_str(" AND prompt_id = ?");
            params_vec.push(Box::new(prompt_id.clone()));
        }

        if let Some(backend) = &filter.backend {
            sql.push_str(" AND backend = ?");
            params_vec.push(Box::new(backend.clone()));
        }

        if let Some(q) = &filter.search {
            sql.push_str(" AND (request_payload LIKE ? OR response_text LIKE ?)");
            let pattern = format!("%{}%", q);
            params_vec.push(Box::new(pattern.clone()));
            params_vec.push(Box::new(pattern));
        }

        sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ?");
        params_vec.push(Box::new(filter.limit.unwrap_or(DEFAULT_HISTORY_LIMIT) as i64));

        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn get(&self, id: &str) -> AppResult<Option<HistoryEntry>> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM history WHERE id = ?1", HISTORY_COLUMNS);
        let entry = conn
            .query_row(&sql, rusqlite::params![id], row_to_entry)
            .optional()?;
        Ok(entry)
    }

    pub fn delete(&self, id: &str) -> AppResult<()> {
        let conn = self.pool.get()?;
        let deleted = conn.execute("DELETE FROM history WHERE id = ?1", rusqlite::params![id])?;
        if deleted == 0 {
            return Err(AppError::not_found(format!("History entry '{}'", id)));
        }
        Ok(())
    }

    /// Remove every entry, returning how many were removed
    pub fn clear(&self) -> AppResult<usize> {
        let conn = self.pool.get()?;
        Ok(conn.execute("DELETE FROM history", [])?)
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<HistoryEntry> {
    let payload_str: String = row.get(4)?;
    let request_payload: RequestPayload = serde_json::from_str(&payload_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let status_str: String = row.get(6)?;
    let status = status_str.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;

    Ok(HistoryEntry {
        id: row.get(0)?,
        prompt_id: row.get(1)?,
        backend: row.get(2)?,
        model: row.get(3)?,
        request_payload,
        response_text: row.get(5)?,
        status,
        error: row.get(7)?,
        duration_ms: row.get::<_, i64>(8)?.max(0) as u64,
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::history::ExecutionStatus;
    use crate::models::prompt::PromptCreateRequest;
    use crate::services::prompt::PromptService;
    use prompt_studio_llm::CompletionOptions;

    fn entry(backend: &str, text: &str, status: ExecutionStatus) -> NewHistoryEntry {
        NewHistoryEntry {
            prompt_id: None,
            backend: backend.to_string(),
            model: "m".to_string(),
            request_payload: RequestPayload {
                text: text.to_string(),
                options: CompletionOptions::default().with_temperature(0.2),
            },
            response_text: format!("re: {}", text),
            status,
            error: None,
            duration_ms: 12,
        }
    }

    #[test]
    fn test_record_and_get() {
        let db = Database::new_in_memory().unwrap();
        let svc = HistoryService::from_database(&db);

        let recorded = svc
            .record(entry("ollama", "hello", ExecutionStatus::Completed))
            .unwrap();
        let fetched = svc.get(&recorded.id).unwrap().unwrap();
        assert_eq!(fetched, recorded);
        assert_eq!(fetched.request_payload.options.temperature, Some(0.2));
        assert_eq!(fetched.duration_ms, 12);
    }

    #[test]
    fn test_list_newest_first_with_filters() {
        let db = Database::new_in_memory().unwrap();
        let svc = HistoryService::from_database(&db);

        svc.record(entry("ollama", "first", ExecutionStatus::Completed))
            .unwrap();
        svc.record(entry("openai", "second", ExecutionStatus::Failed))
            .unwrap();
        svc.record(entry("ollama", "third", ExecutionStatus::Cancelled))
            .unwrap();

        let all = svc.list(&HistoryFilter::default()).unwrap();
        let texts: Vec<&str> = all.iter().map(|e| e.request_payload.text.as_str()).collect();
        assert_eq!(texts, vec!["third", "second", "first"]);

        let ollama = svc
            .list(&HistoryFilter {
                backend: Some("ollama".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ollama.len(), 2);

        let searched = svc
            .list(&HistoryFilter {
                search: Some("second".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].status, ExecutionStatus::Failed);

        let limited = svc
            .list(&HistoryFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_entries_survive_prompt_deletion() {
        let db = Database::new_in_memory().unwrap();
        let prompts = PromptService::from_database(&db);
        let svc = HistoryService::from_database(&db);

        let prompt = prompts
            .create_prompt(PromptCreateRequest {
                name: "Doomed".to_string(),
                content: "x".to_string(),
                ..Default::default()
            })
            .unwrap();

        let mut new_entry = entry("ollama", "x", ExecutionStatus::Completed);
        new_entry.prompt_id = Some(prompt.id.clone());
        let recorded = svc.record(new_entry).unwrap();

        prompts.delete_prompt(&prompt.id).unwrap();
        let fetched = svc.get(&recorded.id).unwrap().unwrap();
        assert_eq!(fetched.prompt_id, None);
    }

    #[test]
    fn test_delete_and_clear() {
        let db = Database::new_in_memory().unwrap();
        let svc = HistoryService::from_database(&db);
        let a = svc
            .record(entry("ollama", "a", ExecutionStatus::Completed))
            .unwrap();
        svc.record(entry("ollama", "b", ExecutionStatus::Completed))
            .unwrap();

        svc.delete(&a.id).unwrap();
        assert!(matches!(svc.delete(&a.id), Err(AppError::NotFound(_))));
        assert_eq!(svc.clear().unwrap(), 1);
        assert!(svc.list(&HistoryFilter::default()).unwrap().is_empty());
    }
}
