//! # SunSun Archive CLI (`sunsun`)
//!
//! Command-line access to the archive, plus the `serve` command that starts
//! the JSON API.
//!
//! ## Usage
//!
//! ```bash
//! sunsun [--config ./config/sunsun.toml] <command>
//! ```
//!
//! Without `--config` the built-in defaults are used: the public Dropbox
//! source and a cache file in the system temp directory.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sunsun serve` | Start the JSON HTTP API |
//! | `sunsun fetch` | Download (or reuse) and verify the cached database |
//! | `sunsun stats` | Archive statistics |
//! | `sunsun search <q>` | Scripts containing a keyword |
//! | `sunsun search-scripts [--query] [--theme] [--year]` | Paged script listing |
//! | `sunsun search-dialogues [--query] [--character]` | Paged line listing |
//! | `sunsun script <name> [-k <keyword>]` | Full transcript of one script |
//! | `sunsun scripts [--contains <s>] [--diagnostics]` | List script names |
//! | `sunsun characters` | Line and script counts per character |
//! | `sunsun themes` | Script counts per theme |
//!
//! Query commands print the same JSON payloads the HTTP API returns.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sunsun_archive::config::{self, Config};
use sunsun_archive::fetch::{validate_database_file, DatabaseCache};
use sunsun_archive::browse::{self, DialogueFilter, PageRequest, ScriptFilter};
use sunsun_archive::{catalog, script, search, server, stats};

/// SunSun Archive: search the dialogue of every SunSun script.
#[derive(Parser)]
#[command(name = "sunsun", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the JSON HTTP API.
    Serve,

    /// Download the database if it is not cached yet, then verify it.
    Fetch,

    /// Show archive statistics.
    Stats,

    /// Find scripts whose dialogue contains a keyword.
    Search {
        /// Keyword, matched case-insensitively.
        query: String,
    },

    /// Page through scripts, optionally filtered.
    SearchScripts {
        /// Text in the script name, video title, themes or subjects.
        #[arg(long, short)]
        query: Option<String>,

        /// Text in the themes list.
        #[arg(long)]
        theme: Option<String>,

        /// Release date prefix, e.g. `2021`.
        #[arg(long)]
        year: Option<String>,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        offset: Option<u32>,
    },

    /// Page through lines, optionally filtered.
    SearchDialogues {
        /// Text in the line.
        #[arg(long, short)]
        query: Option<String>,

        /// Exact speaker name.
        #[arg(long)]
        character: Option<String>,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        offset: Option<u32>,
    },

    /// Show the full transcript of one script.
    Script {
        /// Script name. Surrounding whitespace is ignored.
        name: String,

        /// Flag the lines containing this keyword.
        #[arg(long, short)]
        keyword: Option<String>,
    },

    /// List script names.
    Scripts {
        /// Only names containing this text (case-insensitive).
        #[arg(long)]
        contains: Option<String>,

        /// Include per-name whitespace and Unicode diagnostics.
        #[arg(long)]
        diagnostics: bool,
    },

    /// List characters by number of lines.
    Characters,

    /// List themes by number of scripts.
    Themes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Fetch => {
            let cache = DatabaseCache::new(&cfg.db)?;
            let path = cache.ensure_database().await?;
            let size = validate_database_file(&path, cfg.db.min_bytes).await?;
            println!("Database ready at {} ({} bytes)", path.display(), size);
        }
        Commands::Stats => {
            let cache = DatabaseCache::new(&cfg.db)?;
            print_json(&stats::get_stats(&cache).await?)?;
        }
        Commands::Search { query } => {
            let cache = DatabaseCache::new(&cfg.db)?;
            print_json(&search::search_keyword(&cache, &query).await?)?;
        }
        Commands::SearchScripts {
            query,
            theme,
            year,
            limit,
            offset,
        } => {
            let page = PageRequest::new(limit, offset)?;
            let filter = ScriptFilter { query, theme, year };
            let cache = DatabaseCache::new(&cfg.db)?;
            print_json(&browse::search_scripts(&cache, &filter, page).await?)?;
        }
        Commands::SearchDialogues {
            query,
            character,
            limit,
            offset,
        } => {
            let page = PageRequest::new(limit, offset)?;
            let filter = DialogueFilter { query, character };
            let cache = DatabaseCache::new(&cfg.db)?;
            print_json(&browse::search_dialogues(&cache, &filter, page).await?)?;
        }
        Commands::Script { name, keyword } => {
            let cache = DatabaseCache::new(&cfg.db)?;
            let detail = script::get_script_detail(&cache, &name, keyword.as_deref()).await?;
            print_json(&detail)?;
        }
        Commands::Scripts {
            contains,
            diagnostics,
        } => {
            let cache = DatabaseCache::new(&cfg.db)?;
            let list = catalog::list_scripts(&cache, contains.as_deref(), diagnostics).await?;
            print_json(&list)?;
        }
        Commands::Characters => {
            let cache = DatabaseCache::new(&cfg.db)?;
            print_json(&catalog::list_characters(&cache).await?)?;
        }
        Commands::Themes => {
            let cache = DatabaseCache::new(&cfg.db)?;
            print_json(&catalog::list_themes(&cache).await?)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{}", text);
    Ok(())
}
