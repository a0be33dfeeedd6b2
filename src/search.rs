//! Keyword search across the archive.
//!
//! One `LIKE` query pulls every line whose dialogue, script name, video
//! title, themes or subjects mention the keyword. The rows are then grouped
//! by script. Only lines whose *dialogue* contains the keyword count as
//! matches, so a script that matched on its title alone drops out.
//!
//! Scripts are ranked by match count, newest release first on ties.

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::db;
use crate::error::{ArchiveError, Result};
use crate::fetch::DatabaseCache;
use crate::models::{DialogueLine, DialogueRow, HAS_DIALOGUE};
use crate::normalize::{contains_ignore_case, like_pattern};

/// Matching lines embedded per script in a search result.
pub const SAMPLE_LIMIT: usize = 3;

/// A script that contains the keyword, with a short sample of matching lines.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptMatch {
    pub script_name: String,
    pub script_url: String,
    pub release_date: String,
    pub youtube_title: String,
    pub youtube_url: String,
    /// At most [`SAMPLE_LIMIT`] lines, in reading order.
    pub dialogues: Vec<DialogueLine>,
    /// Speakers of the matching lines, comma separated, first-seen order.
    pub characters: String,
    /// Number of matching lines, not capped.
    pub match_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub keyword: String,
    pub total_results: usize,
    pub data: Vec<ScriptMatch>,
}

/// Opens the cached archive and runs [`search_keyword_in`].
pub async fn search_keyword(cache: &DatabaseCache, keyword: &str) -> Result<SearchResponse> {
    let keyword = require_keyword(keyword)?;
    let pool = db::open(cache).await?;
    let result = search_keyword_in(&pool, keyword).await;
    pool.close().await;
    result
}

pub async fn search_keyword_in(pool: &SqlitePool, keyword: &str) -> Result<SearchResponse> {
    let keyword = require_keyword(keyword)?;
    let rows = fetch_candidates(pool, keyword).await?;
    let data = group_matches(rows, keyword);

    Ok(SearchResponse {
        keyword: keyword.to_string(),
        total_results: data.len(),
        data,
    })
}

fn require_keyword(keyword: &str) -> Result<&str> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Err(ArchiveError::validation("keyword (q) must not be empty"));
    }
    Ok(keyword)
}

/// SQLite `LIKE` folds case for ASCII letters only. A line whose non-ASCII
/// letters differ in case from the keyword (`Äpfel` for `äpfel`) is never
/// fetched, even though [`group_matches`] would count it.
async fn fetch_candidates(pool: &SqlitePool, keyword: &str) -> Result<Vec<DialogueRow>> {
    let pattern = like_pattern(keyword);
    let sql = format!(
        r#"
        SELECT
            script_name,
            COALESCE(script_url, '') AS script_url,
            COALESCE(character, '') AS character,
            dialogue,
            CAST(COALESCE(row_number, 0) AS INTEGER) AS row_number,
            COALESCE(release_date, '') AS release_date,
            COALESCE(youtube_title, '') AS youtube_title,
            COALESCE(youtube_url, '') AS youtube_url
        FROM dialogues
        WHERE (
            dialogue LIKE ? ESCAPE '\'
            OR script_name LIKE ? ESCAPE '\'
            OR youtube_title LIKE ? ESCAPE '\'
            OR themes LIKE ? ESCAPE '\'
            OR subjects LIKE ? ESCAPE '\'
        )
        AND script_name IS NOT NULL
        AND {}
        ORDER BY script_name, row_number
        "#,
        HAS_DIALOGUE
    );

    let rows = sqlx::query(&sql)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| DialogueRow {
            script_name: row.get("script_name"),
            script_url: row.get("script_url"),
            character: row.get("character"),
            dialogue: row.get("dialogue"),
            row_number: row.get("row_number"),
            release_date: row.get("release_date"),
            youtube_title: row.get("youtube_title"),
            youtube_url: row.get("youtube_url"),
        })
        .collect())
}

/// Groups candidate rows by script and ranks the scripts.
///
/// Script metadata comes from the first row seen for that script. Input
/// order is kept for the sample lines and, among equally ranked scripts,
/// for the scripts themselves.
pub fn group_matches(rows: Vec<DialogueRow>, keyword: &str) -> Vec<ScriptMatch> {
    struct Group {
        result: ScriptMatch,
        characters: Vec<String>,
    }

    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let slot = *index.entry(row.script_name.clone()).or_insert_with(|| {
            groups.push(Group {
                result: ScriptMatch {
                    script_name: row.script_name.clone(),
                    script_url: row.script_url.clone(),
                    release_date: row.release_date.clone(),
                    youtube_title: row.youtube_title.clone(),
                    youtube_url: row.youtube_url.clone(),
                    dialogues: Vec::new(),
                    characters: String::new(),
                    match_count: 0,
                },
                characters: Vec::new(),
            });
            groups.len() - 1
        });

        if !contains_ignore_case(&row.dialogue, keyword) {
            continue;
        }

        let group = &mut groups[slot];
        group.result.match_count += 1;
        if !row.character.is_empty() && !group.characters.contains(&row.character) {
            group.characters.push(row.character.clone());
        }
        if group.result.dialogues.len() < SAMPLE_LIMIT {
            group.result.dialogues.push(DialogueLine {
                character: row.character,
                dialogue: row.dialogue,
                row_number: row.row_number,
            });
        }
    }

    let mut results: Vec<ScriptMatch> = groups
        .into_iter()
        .filter(|g| g.result.match_count > 0)
        .map(|g| ScriptMatch {
            characters: g.characters.join(", "),
            ..g.result
        })
        .collect();

    results.sort_by(|a, b| {
        b.match_count
            .cmp(&a.match_count)
            .then_with(|| b.release_date.cmp(&a.release_date))
    });

    results
}
