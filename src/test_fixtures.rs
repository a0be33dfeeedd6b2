//! Small on-disk archive used by the query tests.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tempfile::TempDir;

use crate::config::{DbConfig, DEFAULT_USER_AGENT};
use crate::fetch::DatabaseCache;

pub struct Fixture {
    // Held so the directory outlives the cache.
    pub _tmp: TempDir,
    pub cache: DatabaseCache,
}

struct Script {
    name: &'static str,
    release_date: &'static str,
    youtube_title: &'static str,
    youtube_url: &'static str,
    themes: &'static str,
    lines: &'static [(i64, &'static str, Option<&'static str>)],
}

const SCRIPTS: &[Script] = &[
    Script {
        name: "A101",
        release_date: "2021-04-01",
        youtube_title: "Orchard Day",
        youtube_url: "https://youtu.be/a101",
        themes: "food, friendship",
        lines: &[
            (1, "SunSun", Some("I like apples")),
            (2, "Moon", Some("Apple pie!")),
            (3, "SunSun", Some("Good morning")),
            (4, "Moon", Some("APPLE juice")),
            (5, "Star", Some("")),
            (6, "Star", Some("apple tree")),
            (7, "SunSun", Some("one more apple")),
        ],
    },
    Script {
        name: "B2231 ",
        release_date: "2022-08-15",
        youtube_title: "Picnic",
        youtube_url: "",
        themes: "friendship",
        lines: &[
            (1, "Moon", Some("apple")),
            (2, "Moon", Some("Apple?")),
            (3, "SunSun", Some("apples everywhere")),
            (4, "Star", Some("apple again")),
            (5, "Star", Some("last apple")),
            (6, "SunSun", None),
        ],
    },
    Script {
        name: "C300",
        release_date: "2023-01-10",
        youtube_title: "Song Time",
        youtube_url: "https://youtu.be/c300",
        themes: "music",
        lines: &[
            (3, "SunSun", Some("sing a song")),
            (1, "Moon", Some("apple song")),
            (2, "Star", Some("Apple!")),
        ],
    },
    Script {
        name: "Cafe\u{301}",
        release_date: "2020-12-01",
        youtube_title: "Apple Cafe",
        youtube_url: "https://youtu.be/cafe",
        themes: "food",
        lines: &[
            (1, "Moon", Some("coffee time")),
            (2, "SunSun", Some("tea time")),
        ],
    },
];

pub async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("archive.db");

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    sqlx::query(
        r#"
        CREATE TABLE dialogues (
            id INTEGER PRIMARY KEY,
            script_name TEXT,
            script_url TEXT,
            character TEXT,
            dialogue TEXT,
            row_number INTEGER,
            release_date TEXT,
            youtube_title TEXT,
            youtube_url TEXT,
            youtube_video_id TEXT,
            themes TEXT,
            subjects TEXT,
            category TEXT
        )
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    for script in SCRIPTS {
        let video_id = script.youtube_url.rsplit('/').next().unwrap_or("");
        for (row_number, character, dialogue) in script.lines {
            sqlx::query(
                "INSERT INTO dialogues (script_name, script_url, character, dialogue, row_number, release_date, youtube_title, youtube_url, youtube_video_id, themes, subjects, category) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(script.name)
            .bind(format!("https://scripts.example.com/{}", script.name.trim()))
            .bind(*character)
            .bind(*dialogue)
            .bind(*row_number)
            .bind(script.release_date)
            .bind(script.youtube_title)
            .bind(script.youtube_url)
            .bind(video_id)
            .bind(script.themes)
            .bind("daily life")
            .bind("episode")
            .execute(&pool)
            .await
            .unwrap();
        }
    }

    pool.close().await;

    let config = DbConfig {
        // Never contacted: the file above is already in place.
        source_url: "http://127.0.0.1:9/unused".to_string(),
        cache_path: path,
        min_bytes: 1024,
        max_redirects: 2,
        user_agent: DEFAULT_USER_AGENT.to_string(),
        timeout_secs: Some(5),
    };

    Fixture {
        cache: DatabaseCache::new(&config).unwrap(),
        _tmp: tmp,
    }
}
