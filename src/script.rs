//! Full transcript of one script.
//!
//! Names are matched through [`normalize`] on both sides. When the same
//! script was stored under several spellings that normalize to the same
//! name (for example with and without a trailing space), all of them are
//! treated as one script.

use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::error::{ArchiveError, Result};
use crate::fetch::DatabaseCache;
use crate::models::HAS_DIALOGUE;
use crate::normalize::{contains_ignore_case, normalize};

/// Near-miss names reported when a lookup fails.
const SIMILAR_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScriptLine {
    pub character: String,
    pub dialogue: String,
    pub row_number: i64,
    pub is_match: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptDetail {
    pub script_name: String,
    pub script_url: String,
    pub release_date: String,
    pub youtube_title: String,
    pub youtube_url: String,
    pub youtube_video_id: String,
    pub themes: String,
    pub subjects: String,
    pub category: String,
    pub total_dialogues: usize,
    pub match_count: usize,
    /// `match_count / total_dialogues`, or 0 without a keyword.
    pub match_confidence: f64,
    pub keyword: String,
    pub dialogues: Vec<ScriptLine>,
}

pub async fn get_script_detail(
    cache: &DatabaseCache,
    script_name: &str,
    keyword: Option<&str>,
) -> Result<ScriptDetail> {
    if script_name.trim().is_empty() {
        return Err(ArchiveError::validation("script_name must not be empty"));
    }

    let pool = db::open(cache).await?;
    let result = get_script_detail_in(&pool, script_name, keyword).await;
    pool.close().await;
    result
}

pub async fn get_script_detail_in(
    pool: &SqlitePool,
    script_name: &str,
    keyword: Option<&str>,
) -> Result<ScriptDetail> {
    let wanted = normalize(script_name);
    if wanted.is_empty() {
        return Err(ArchiveError::validation("script_name must not be empty"));
    }

    let stored = stored_names(pool).await?;
    let variants: Vec<&String> = stored.iter().filter(|s| normalize(s) == wanted).collect();

    if variants.is_empty() {
        return Err(not_found(script_name, &wanted, &stored));
    }

    let meta = sqlx::query(
        r#"
        SELECT
            COALESCE(script_url, '') AS script_url,
            COALESCE(release_date, '') AS release_date,
            COALESCE(youtube_title, '') AS youtube_title,
            COALESCE(youtube_url, '') AS youtube_url,
            COALESCE(youtube_video_id, '') AS youtube_video_id,
            COALESCE(themes, '') AS themes,
            COALESCE(subjects, '') AS subjects,
            COALESCE(category, '') AS category
        FROM dialogues
        WHERE script_name = ?
        LIMIT 1
        "#,
    )
    .bind(variants[0].as_str())
    .fetch_one(pool)
    .await?;

    let placeholders = vec!["?"; variants.len()].join(", ");
    let sql = format!(
        r#"
        SELECT
            COALESCE(character, '') AS character,
            dialogue,
            CAST(COALESCE(row_number, 0) AS INTEGER) AS row_number
        FROM dialogues
        WHERE script_name IN ({})
        AND {}
        ORDER BY row_number
        "#,
        placeholders, HAS_DIALOGUE
    );

    let mut query = sqlx::query(&sql);
    for name in &variants {
        query = query.bind(name.as_str());
    }
    let rows = query.fetch_all(pool).await?;

    let keyword = keyword.map(str::trim).unwrap_or("");
    let dialogues: Vec<ScriptLine> = rows
        .iter()
        .map(|row| {
            let dialogue: String = row.get("dialogue");
            ScriptLine {
                character: row.get("character"),
                is_match: !keyword.is_empty() && contains_ignore_case(&dialogue, keyword),
                dialogue,
                row_number: row.get("row_number"),
            }
        })
        .collect();

    let match_count = dialogues.iter().filter(|d| d.is_match).count();
    let match_confidence = if keyword.is_empty() || dialogues.is_empty() {
        0.0
    } else {
        match_count as f64 / dialogues.len() as f64
    };

    Ok(ScriptDetail {
        script_name: wanted,
        script_url: meta.get("script_url"),
        release_date: meta.get("release_date"),
        youtube_title: meta.get("youtube_title"),
        youtube_url: meta.get("youtube_url"),
        youtube_video_id: meta.get("youtube_video_id"),
        themes: meta.get("themes"),
        subjects: meta.get("subjects"),
        category: meta.get("category"),
        total_dialogues: dialogues.len(),
        match_count,
        match_confidence,
        keyword: keyword.to_string(),
        dialogues,
    })
}

async fn stored_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let names = sqlx::query_scalar(
        "SELECT DISTINCT script_name FROM dialogues WHERE script_name IS NOT NULL ORDER BY script_name",
    )
    .fetch_all(pool)
    .await?;
    Ok(names)
}

fn not_found(raw: &str, wanted: &str, stored: &[String]) -> ArchiveError {
    let needle = wanted.to_lowercase();
    let similar: Vec<&String> = stored
        .iter()
        .filter(|s| normalize(s).to_lowercase().contains(&needle))
        .take(SIMILAR_LIMIT)
        .collect();

    ArchiveError::NotFound {
        message: format!("script not found: {}", wanted),
        debug: Some(serde_json::json!({
            "searched_for": raw,
            "searched_length": raw.chars().count(),
            "similar_names": similar,
        })),
    }
}
