//! Listings over the whole archive: script names, characters, themes.

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::db;
use crate::error::Result;
use crate::fetch::DatabaseCache;
use crate::models::HAS_DIALOGUE;
use crate::normalize::{contains_ignore_case, diagnose, normalize, NameDiagnostics};

#[derive(Debug, Clone, Serialize)]
pub struct ScriptEntry {
    pub name: String,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<NameDiagnostics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptList {
    pub total_found: usize,
    /// Echo of the `contains` filter, if one was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
    pub scripts: Vec<ScriptEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CharacterSummary {
    pub character: String,
    pub dialogue_count: i64,
    pub script_count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ThemeCount {
    pub theme: String,
    /// Number of scripts tagged with the theme.
    pub count: usize,
}

pub async fn list_scripts(
    cache: &DatabaseCache,
    contains: Option<&str>,
    diagnostics: bool,
) -> Result<ScriptList> {
    let pool = db::open(cache).await?;
    let result = list_scripts_in(&pool, contains, diagnostics).await;
    pool.close().await;
    result
}

/// Distinct script names in byte order.
///
/// `contains` filters on the normalized name, case-insensitively. With
/// `diagnostics` every entry carries a [`NameDiagnostics`] so names with
/// stray whitespace or non-canonical Unicode can be spotted.
pub async fn list_scripts_in(
    pool: &SqlitePool,
    contains: Option<&str>,
    diagnostics: bool,
) -> Result<ScriptList> {
    let names: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT DISTINCT script_name FROM dialogues WHERE script_name IS NOT NULL AND {} ORDER BY script_name",
        HAS_DIALOGUE
    ))
    .fetch_all(pool)
    .await?;

    let filter = contains.map(normalize).filter(|f| !f.is_empty());
    let scripts: Vec<ScriptEntry> = names
        .into_iter()
        .filter(|name| match &filter {
            Some(f) => contains_ignore_case(&normalize(name), f),
            None => true,
        })
        .map(|name| ScriptEntry {
            diagnostics: diagnostics.then(|| diagnose(&name)),
            name,
        })
        .collect();

    Ok(ScriptList {
        total_found: scripts.len(),
        search_term: filter,
        scripts,
    })
}

pub async fn list_characters(cache: &DatabaseCache) -> Result<Vec<CharacterSummary>> {
    let pool = db::open(cache).await?;
    let result = list_characters_in(&pool).await;
    pool.close().await;
    result
}

pub async fn list_characters_in(pool: &SqlitePool) -> Result<Vec<CharacterSummary>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT
            character,
            COUNT(*) AS dialogue_count,
            COUNT(DISTINCT script_name) AS script_count
        FROM dialogues
        WHERE character IS NOT NULL AND character != '' AND {}
        GROUP BY character
        ORDER BY dialogue_count DESC, character ASC
        "#,
        HAS_DIALOGUE
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| CharacterSummary {
            character: row.get("character"),
            dialogue_count: row.get("dialogue_count"),
            script_count: row.get("script_count"),
        })
        .collect())
}

pub async fn list_themes(cache: &DatabaseCache) -> Result<Vec<ThemeCount>> {
    let pool = db::open(cache).await?;
    let result = list_themes_in(&pool).await;
    pool.close().await;
    result
}

pub async fn list_themes_in(pool: &SqlitePool) -> Result<Vec<ThemeCount>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT DISTINCT script_name, themes
        FROM dialogues
        WHERE themes IS NOT NULL AND themes != '' AND {}
        "#,
        HAS_DIALOGUE
    ))
    .fetch_all(pool)
    .await?;

    let tagged: Vec<(String, String)> = rows
        .iter()
        .map(|row| (row.get("script_name"), row.get("themes")))
        .collect();

    Ok(count_themes(&tagged))
}

/// Splits comma-separated theme lists and counts the distinct scripts per
/// theme. Both ASCII and ideographic commas separate themes.
pub fn count_themes(tagged: &[(String, String)]) -> Vec<ThemeCount> {
    let mut scripts_by_theme: HashMap<String, Vec<&str>> = HashMap::new();

    for (script, themes) in tagged {
        for theme in themes.split([',', '、']) {
            let theme = theme.trim();
            if theme.is_empty() {
                continue;
            }
            let scripts = scripts_by_theme.entry(theme.to_string()).or_default();
            if !scripts.contains(&script.as_str()) {
                scripts.push(script);
            }
        }
    }

    let mut counts: Vec<ThemeCount> = scripts_by_theme
        .into_iter()
        .map(|(theme, scripts)| ThemeCount {
            theme,
            count: scripts.len(),
        })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.theme.cmp(&b.theme)));
    counts
}
