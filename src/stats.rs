//! Archive statistics.
//!
//! A quick summary of what the archive holds: how many scripts and lines,
//! how many scripts are linked to a video, who speaks the most, and how the
//! scripts spread over release years. Only rows with dialogue are counted.

use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::error::Result;
use crate::fetch::DatabaseCache;
use crate::models::HAS_DIALOGUE;

const TOP_CHARACTERS: i64 = 10;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CharacterCount {
    pub character: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct YearCount {
    pub year: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveStats {
    pub total_scripts: i64,
    pub total_dialogues: i64,
    pub status: String,
    pub youtube_connected: i64,
    /// Percentage of scripts with a video link, two decimals.
    pub youtube_coverage: f64,
    pub character_stats: Vec<CharacterCount>,
    pub year_stats: Vec<YearCount>,
}

pub async fn get_stats(cache: &DatabaseCache) -> Result<ArchiveStats> {
    let pool = db::open(cache).await?;
    let result = get_stats_in(&pool).await;
    pool.close().await;
    result
}

pub async fn get_stats_in(pool: &SqlitePool) -> Result<ArchiveStats> {
    let total_scripts: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(DISTINCT script_name) FROM dialogues WHERE {}",
        HAS_DIALOGUE
    ))
    .fetch_one(pool)
    .await?;

    let total_dialogues: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM dialogues WHERE {}",
        HAS_DIALOGUE
    ))
    .fetch_one(pool)
    .await?;

    let youtube_connected: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(DISTINCT script_name) FROM dialogues WHERE youtube_url IS NOT NULL AND youtube_url != '' AND {}",
        HAS_DIALOGUE
    ))
    .fetch_one(pool)
    .await?;

    let character_rows = sqlx::query(&format!(
        r#"
        SELECT character, COUNT(*) AS count
        FROM dialogues
        WHERE character IS NOT NULL AND character != '' AND {}
        GROUP BY character
        ORDER BY count DESC, character ASC
        LIMIT ?
        "#,
        HAS_DIALOGUE
    ))
    .bind(TOP_CHARACTERS)
    .fetch_all(pool)
    .await?;

    let year_rows = sqlx::query(&format!(
        r#"
        SELECT substr(release_date, 1, 4) AS year, COUNT(DISTINCT script_name) AS count
        FROM dialogues
        WHERE release_date IS NOT NULL AND release_date != '' AND {}
        GROUP BY year
        ORDER BY year
        "#,
        HAS_DIALOGUE
    ))
    .fetch_all(pool)
    .await?;

    Ok(ArchiveStats {
        total_scripts,
        total_dialogues,
        status: "Database loaded successfully".to_string(),
        youtube_connected,
        youtube_coverage: coverage_percent(youtube_connected, total_scripts),
        character_stats: character_rows
            .iter()
            .map(|row| CharacterCount {
                character: row.get("character"),
                count: row.get("count"),
            })
            .collect(),
        year_stats: year_rows
            .iter()
            .map(|row| YearCount {
                year: row.get("year"),
                count: row.get("count"),
            })
            .collect(),
    })
}

fn coverage_percent(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (part as f64 * 100.0 / total as f64 * 100.0).round() / 100.0
}
