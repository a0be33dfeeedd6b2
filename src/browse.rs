//! Paged browsing of scripts and lines with optional filters.
//!
//! Unlike [`crate::search`], these queries return flat, paged result lists
//! with a total count, for clients that page through the archive. Every
//! filter is optional and blank values are ignored; with no filters the
//! whole archive is listed.
//!
//! Pages are ordered newest release first, so page boundaries are stable
//! while the database does not change.

use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::error::{ArchiveError, Result};
use crate::fetch::DatabaseCache;
use crate::models::HAS_DIALOGUE;
use crate::normalize::{like_pattern, like_prefix};

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 500;

/// Paging window shared by both queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl PageRequest {
    /// Fills in defaults and rejects a limit outside `1..=MAX_PAGE_LIMIT`.
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Result<Self> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(ArchiveError::validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }
        Ok(Self {
            limit,
            offset: offset.unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    /// Matches across all pages.
    pub total_count: i64,
    pub has_more: bool,
}

impl<T> Page<T> {
    fn new(results: Vec<T>, total_count: i64, page: PageRequest) -> Self {
        Self {
            results,
            total_count,
            has_more: i64::from(page.offset) + i64::from(page.limit) < total_count,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptFilter {
    /// Substring of the script name, video title, themes or subjects.
    pub query: Option<String>,
    /// Substring of the themes list.
    pub theme: Option<String>,
    /// Prefix of the release date, typically a year.
    pub year: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScriptSummary {
    pub script_name: String,
    pub themes: String,
    pub subjects: String,
    pub release_date: String,
    pub youtube_title: String,
    pub youtube_url: String,
    pub dialogue_count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct DialogueFilter {
    /// Substring of the line.
    pub query: Option<String>,
    /// Exact speaker name.
    pub character: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DialogueHit {
    pub script_name: String,
    pub character: String,
    pub dialogue: String,
    pub row_number: i64,
    pub themes: String,
    pub subjects: String,
    pub release_date: String,
    pub youtube_title: String,
    pub youtube_url: String,
}

/// `WHERE` fragments and their positional parameters, in order.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    params: Vec<String>,
}

impl Conditions {
    fn push(&mut self, clause: &str, params: impl IntoIterator<Item = String>) {
        self.clauses.push(clause.to_string());
        self.params.extend(params);
    }

    fn sql(&self) -> String {
        let mut all = vec![HAS_DIALOGUE.to_string(), "script_name IS NOT NULL".to_string()];
        all.extend(self.clauses.iter().cloned());
        all.join(" AND ")
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub async fn search_scripts(
    cache: &DatabaseCache,
    filter: &ScriptFilter,
    page: PageRequest,
) -> Result<Page<ScriptSummary>> {
    let pool = db::open(cache).await?;
    let result = search_scripts_in(&pool, filter, page).await;
    pool.close().await;
    result
}

pub async fn search_scripts_in(
    pool: &SqlitePool,
    filter: &ScriptFilter,
    page: PageRequest,
) -> Result<Page<ScriptSummary>> {
    let mut conditions = Conditions::default();
    if let Some(q) = non_blank(&filter.query) {
        let pattern = like_pattern(q);
        conditions.push(
            r"(script_name LIKE ? ESCAPE '\' OR youtube_title LIKE ? ESCAPE '\' OR themes LIKE ? ESCAPE '\' OR subjects LIKE ? ESCAPE '\')",
            std::iter::repeat(pattern).take(4),
        );
    }
    if let Some(theme) = non_blank(&filter.theme) {
        conditions.push(r"themes LIKE ? ESCAPE '\'", [like_pattern(theme)]);
    }
    if let Some(year) = non_blank(&filter.year) {
        conditions.push(r"release_date LIKE ? ESCAPE '\'", [like_prefix(year)]);
    }
    let where_sql = conditions.sql();

    let sql = format!(
        r#"
        SELECT
            script_name,
            COALESCE(MAX(themes), '') AS themes,
            COALESCE(MAX(subjects), '') AS subjects,
            COALESCE(MAX(release_date), '') AS release_date,
            COALESCE(MAX(youtube_title), '') AS youtube_title,
            COALESCE(MAX(youtube_url), '') AS youtube_url,
            COUNT(*) AS dialogue_count
        FROM dialogues
        WHERE {}
        GROUP BY script_name
        ORDER BY release_date DESC, script_name
        LIMIT ? OFFSET ?
        "#,
        where_sql
    );
    let mut query = sqlx::query(&sql);
    for param in &conditions.params {
        query = query.bind(param.as_str());
    }
    let rows = query
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(pool)
        .await?;

    let count_sql = format!(
        "SELECT COUNT(DISTINCT script_name) FROM dialogues WHERE {}",
        where_sql
    );
    let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
    for param in &conditions.params {
        count = count.bind(param.as_str());
    }
    let total_count: i64 = count.fetch_one(pool).await?;

    let results = rows
        .iter()
        .map(|row| ScriptSummary {
            script_name: row.get("script_name"),
            themes: row.get("themes"),
            subjects: row.get("subjects"),
            release_date: row.get("release_date"),
            youtube_title: row.get("youtube_title"),
            youtube_url: row.get("youtube_url"),
            dialogue_count: row.get("dialogue_count"),
        })
        .collect();

    Ok(Page::new(results, total_count, page))
}

pub async fn search_dialogues(
    cache: &DatabaseCache,
    filter: &DialogueFilter,
    page: PageRequest,
) -> Result<Page<DialogueHit>> {
    let pool = db::open(cache).await?;
    let result = search_dialogues_in(&pool, filter, page).await;
    pool.close().await;
    result
}

pub async fn search_dialogues_in(
    pool: &SqlitePool,
    filter: &DialogueFilter,
    page: PageRequest,
) -> Result<Page<DialogueHit>> {
    let mut conditions = Conditions::default();
    if let Some(q) = non_blank(&filter.query) {
        conditions.push(r"dialogue LIKE ? ESCAPE '\'", [like_pattern(q)]);
    }
    if let Some(character) = non_blank(&filter.character) {
        conditions.push("character = ?", [character.to_string()]);
    }
    let where_sql = conditions.sql();

    let sql = format!(
        r#"
        SELECT
            script_name,
            COALESCE(character, '') AS character,
            dialogue,
            CAST(COALESCE(row_number, 0) AS INTEGER) AS row_number,
            COALESCE(themes, '') AS themes,
            COALESCE(subjects, '') AS subjects,
            COALESCE(release_date, '') AS release_date,
            COALESCE(youtube_title, '') AS youtube_title,
            COALESCE(youtube_url, '') AS youtube_url
        FROM dialogues
        WHERE {}
        ORDER BY release_date DESC, script_name, row_number
        LIMIT ? OFFSET ?
        "#,
        where_sql
    );
    let mut query = sqlx::query(&sql);
    for param in &conditions.params {
        query = query.bind(param.as_str());
    }
    let rows = query
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(pool)
        .await?;

    let count_sql = format!("SELECT COUNT(*) FROM dialogues WHERE {}", where_sql);
    let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
    for param in &conditions.params {
        count = count.bind(param.as_str());
    }
    let total_count: i64 = count.fetch_one(pool).await?;

    let results = rows
        .iter()
        .map(|row| DialogueHit {
            script_name: row.get("script_name"),
            character: row.get("character"),
            dialogue: row.get("dialogue"),
            row_number: row.get("row_number"),
            themes: row.get("themes"),
            subjects: row.get("subjects"),
            release_date: row.get("release_date"),
            youtube_title: row.get("youtube_title"),
            youtube_url: row.get("youtube_url"),
        })
        .collect();

    Ok(Page::new(results, total_count, page))
}
