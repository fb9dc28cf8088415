//! Prompt Service
//!
//! Business logic for managing prompt templates. Every create or edit
//! re-infers the placeholder schema and merges it with what was declared.

use std::collections::BTreeSet;

use prompt_studio_template::{
    check, infer_schema, merge_with_placeholders, validate_schema, PlaceholderSpec,
};
use rusqlite::OptionalExtension;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::prompt::{PromptCreateRequest, PromptFilter, PromptTemplate, PromptUpdateRequest};
use crate::storage::database::DbPool;
use crate::storage::Database;
use crate::utils::error::{AppError, AppResult};

const PROMPT_COLUMNS: &str = "id, name, content, description, category, tags, placeholders,
    is_favorite, use_count, last_used_at, created_at, updated_at";

/// Service for managing prompt templates
pub struct PromptService {
    pool: DbPool,
}

impl PromptService {
    /// Create a new PromptService with a database pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create from a Database reference
    pub fn from_database(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Seed a few example prompts into an empty library.
    ///
    /// Returns the number of prompts inserted.
    pub fn seed_examples(&self) -> AppResult<usize> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM prompts", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(0);
        }
        drop(conn);

        let examples = [
            (
                "Expert Helper",
                "general",
                "Act as a {{ expertise }} and help with {{ task }}.",
                "Ask for help from a domain expert",
            ),
            (
                "Code Review",
                "coding",
                "Review this {{ language | default('Rust') }} code for bugs and readability:\n\n{{ code }}",
                "Analyze code for issues and improvements",
            ),
            (
                "Summarize",
                "writing",
                "Summarize the following{% if bullet_points %} as bullet points{% endif %}:\n\n{{ text }}",
                "Create concise summaries",
            ),
            (
                "Translate",
                "writing",
                "Translate to {{ language }}:\n\n{{ text }}",
                "Translate text to another language",
            ),
        ];

        for (name, category, content, description) in examples {
            self.create_prompt(PromptCreateRequest {
                name: name.to_string(),
                content: content.to_string(),
                description: Some(description.to_string()),
                category: Some(category.to_string()),
                tags: vec!["example".to_string()],
                ..Default::default()
            })?;
        }

        info!("[Prompts] Seeded {} example prompts", examples.len());
        Ok(examples.len())
    }

    /// List prompts matching a filter, favorites and most used first
    pub fn list_prompts(&self, filter: &PromptFilter) -> AppResult<Vec<PromptTemplate>> {
        let conn = self.pool.get()?;

        let mut sql = format!("SELECT {} FROM prompts WHERE 1=1", PROMPT_COLUMNS);
        let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(cat) = &filter.category {
            sql.push_str(" AND category = ?");
            params_vec.push(Box::new(cat.clone()));
        }

        if let Some(q) = &filter.search {
            sql.push_str(" AND (name LIKE ? OR description LIKE ? OR content LIKE ?)");
            let pattern = format!("%{}%", q);
            params_vec.push(Box::new(pattern.clone()));
            params_vec.push(Box::new(pattern.clone()));
            params_vec.push(Box::new(pattern));
        }

        if let Some(tag) = &filter.tag {
            sql.push_str(" AND EXISTS (SELECT 1 FROM json_each(prompts.tags) WHERE value = ?)");
            params_vec.push(Box::new(tag.clone()));
        }

        if filter.favorites_only {
            sql.push_str(" AND is_favorite = 1");
        }

        sql.push_str(" ORDER BY is_favorite DESC, use_count DESC, name ASC");

        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(row_to_prompt(row)))?;

        let mut prompts = Vec::new();
        for row in rows {
            prompts.push(row?);
        }

        Ok(prompts)
    }

    /// Get a single prompt by ID
    pub fn get_prompt(&self, id: &str) -> AppResult<Option<PromptTemplate>> {
        self.query_one("id", id)
    }

    /// Get a single prompt by its unique name
    pub fn get_prompt_by_name(&self, name: &str) -> AppResult<Option<PromptTemplate>> {
        self.query_one("name", name)
    }

    /// Resolve a prompt by ID or name
    pub fn find(&self, id_or_name: &str) -> AppResult<PromptTemplate> {
        if let Some(prompt) = self.get_prompt(id_or_name)? {
            return Ok(prompt);
        }
        self.get_prompt_by_name(id_or_name)?
            .ok_or_else(|| AppError::not_found(format!("Prompt '{}'", id_or_name)))
    }

    fn query_one(&self, column: &str, value: &str) -> AppResult<Option<PromptTemplate>> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM prompts WHERE {} = ?1", PROMPT_COLUMNS, column);
        let result = conn
            .query_row(&sql, rusqlite::params![value], |row| Ok(row_to_prompt(row)))
            .optional()?;
        Ok(result)
    }

    /// Create a new prompt template
    pub fn create_prompt(&self, req: PromptCreateRequest) -> AppResult<PromptTemplate> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("Prompt name must not be empty"));
        }
        if self.get_prompt_by_name(&name)?.is_some() {
            return Err(AppError::validation(format!(
                "A prompt named '{}' already exists",
                name
            )));
        }

        let placeholders = build_schema(&req.content, req.placeholders.as_deref(), &[])?;

        let id = Uuid::new_v4().to_string();
        let tags_json = serde_json::to_string(&req.tags)?;
        let placeholders_json = serde_json::to_string(&placeholders)?;

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO prompts (id, name, content, description, category, tags, placeholders, is_favorite, use_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
            rusqlite::params![
                id,
                name,
                req.content,
                req.description,
                req.category,
                tags_json,
                placeholders_json,
                req.is_favorite as i32,
            ],
        )?;
        drop(conn);

        debug!("[Prompts] Created '{}' ({} placeholders)", name, placeholders.len());
        self.get_prompt(&id)?
            .ok_or_else(|| AppError::database("Failed to retrieve created prompt"))
    }

    /// Update an existing prompt template
    pub fn update_prompt(&self, id: &str, req: PromptUpdateRequest) -> AppResult<PromptTemplate> {
        let existing = self
            .get_prompt(id)?
            .ok_or_else(|| AppError::not_found(format!("Prompt '{}'", id)))?;

        let name = match req.name {
            Some(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(AppError::validation("Prompt name must not be empty"));
                }
                if let Some(other) = self.get_prompt_by_name(&name)? {
                    if other.id != existing.id {
                        return Err(AppError::validation(format!(
                            "A prompt named '{}' already exists",
                            name
                        )));
                    }
                }
                name
            }
            None => existing.name,
        };
        let content = req.content.unwrap_or(existing.content);
        let description = req.description.or(existing.description);
        let category = req.category.or(existing.category);
        let tags = req.tags.unwrap_or(existing.tags);
        let is_favorite = req.is_favorite.unwrap_or(existing.is_favorite);
        let placeholders =
            build_schema(&content, req.placeholders.as_deref(), &existing.placeholders)?;

        let tags_json = serde_json::to_string(&tags)?;
        let placeholders_json = serde_json::to_string(&placeholders)?;

        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE prompts SET name = ?1, content = ?2, description = ?3, category = ?4,
             tags = ?5, placeholders = ?6, is_favorite = ?7, updated_at = datetime('now')
             WHERE id = ?8",
            rusqlite::params![
                name,
                content,
                description,
                category,
                tags_json,
                placeholders_json,
                is_favorite as i32,
                id,
            ],
        )?;
        drop(conn);

        self.get_prompt(id)?
            .ok_or_else(|| AppError::database("Failed to retrieve updated prompt"))
    }

    /// Delete a prompt. History entries keep their data but lose the link.
    pub fn delete_prompt(&self, id: &str) -> AppResult<()> {
        let conn = self.pool.get()?;
        let deleted = conn.execute("DELETE FROM prompts WHERE id = ?1", rusqlite::params![id])?;
        if deleted == 0 {
            return Err(AppError::not_found(format!("Prompt '{}'", id)));
        }
        Ok(())
    }

    /// Record usage of a prompt (increment use_count, update last_used_at)
    pub fn record_use(&self, id: &str) -> AppResult<()> {
        let conn = self.pool.get()?;

        conn.execute(
            "UPDATE prompts SET use_count = use_count + 1, last_used_at = datetime('now')
             WHERE id = ?1",
            rusqlite::params![id],
        )?;

        Ok(())
    }

    /// Toggle favorite status of a prompt
    pub fn toggle_favorite(&self, id: &str) -> AppResult<PromptTemplate> {
        let conn = self.pool.get()?;

        let changed = conn.execute(
            "UPDATE prompts SET is_favorite = CASE WHEN is_favorite = 1 THEN 0 ELSE 1 END,
             updated_at = datetime('now')
             WHERE id = ?1",
            rusqlite::params![id],
        )?;
        drop(conn);

        if changed == 0 {
            return Err(AppError::not_found(format!("Prompt '{}'", id)));
        }

        self.get_prompt(id)?
            .ok_or_else(|| AppError::database("Failed to retrieve updated prompt"))
    }

    /// Distinct categories in use, sorted
    pub fn list_categories(&self) -> AppResult<Vec<String>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT category FROM prompts WHERE category IS NOT NULL ORDER BY category",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }
        Ok(categories)
    }

    /// Distinct tags across the library, sorted
    pub fn list_tags(&self) -> AppResult<Vec<String>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT tags FROM prompts")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut tags = BTreeSet::new();
        for row in rows {
            let parsed: Vec<String> = serde_json::from_str(&row?).unwrap_or_default();
            tags.extend(parsed);
        }
        Ok(tags.into_iter().collect())
    }
}

/// Compute the stored schema for template content.
///
/// A declared schema is validated against the content first; the result is
/// then merged with the placeholders the content actually uses, so new names
/// are inferred and vanished ones dropped.
fn build_schema(
    content: &str,
    declared: Option<&[PlaceholderSpec]>,
    previous: &[PlaceholderSpec],
) -> AppResult<Vec<PlaceholderSpec>> {
    check(content)?;
    let schema = match declared {
        Some(declared) => {
            validate_schema(content, declared)?;
            merge_with_placeholders(declared, content)
        }
        None if previous.is_empty() => infer_schema(content),
        None => merge_with_placeholders(previous, content),
    };
    Ok(schema)
}

/// Convert a database row to a PromptTemplate
fn row_to_prompt(row: &rusqlite::Row) -> PromptTemplate {
    let tags_str: String = row.get::<_, String>(5).unwrap_or_else(|_| "[]".to_string());
    let placeholders_str: String = row.get::<_, String>(6).unwrap_or_else(|_| "[]".to_string());

    PromptTemplate {
        id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        content: row.get(2).unwrap_or_default(),
        description: row.get(3).unwrap_or(None),
        category: row.get(4).unwrap_or(None),
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        placeholders: serde_json::from_str(&placeholders_str).unwrap_or_default(),
        is_favorite: row.get::<_, i32>(7).unwrap_or(0) != 0,
        use_count: row.get::<_, u32>(8).unwrap_or(0),
        last_used_at: row.get(9).unwrap_or(None),
        created_at: row.get(10).unwrap_or(None),
        updated_at: row.get(11).unwrap_or(None),
    }
}
