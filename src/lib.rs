//! # SunSun Archive
//!
//! A read-only archive of the *SunSun* children's programme: every script,
//! line by line, with the speaking character, release date and the linked
//! YouTube episode.
//!
//! The data lives in a single SQLite file published on Dropbox. The first
//! query downloads it into a local cache; later queries reuse the cached
//! copy without touching the network.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │ Dropbox  │──▶│ DatabaseCache│──▶│  SQLite   │
//! │  (HTTP)  │   │ fetch+verify │   │ read-only │
//! └──────────┘   └──────────────┘   └─────┬─────┘
//!                                         │
//!                     ┌───────────────────┤
//!                     ▼                   ▼
//!                ┌──────────┐       ┌──────────┐
//!                │   CLI    │       │   HTTP   │
//!                │ (sunsun) │       │  (JSON)  │
//!                └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sunsun fetch                  # download and verify the archive
//! sunsun search "apple"         # scripts mentioning a keyword
//! sunsun script A101 -k apple   # one transcript, matches flagged
//! sunsun serve                  # start the JSON API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`fetch`] | Download, validate and cache the database file |
//! | [`db`] | Read-only connection to the cached file |
//! | [`models`] | Row types shared by the queries |
//! | [`normalize`] | Script-name normalization and diagnostics |
//! | [`stats`] | Archive statistics |
//! | [`search`] | Keyword search grouped by script |
//! | [`browse`] | Paged script and line listings with filters |
//! | [`script`] | Single script transcript |
//! | [`catalog`] | Script, character and theme listings |
//! | [`server`] | JSON HTTP API |
//! | [`error`] | Error types |

pub mod browse;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod models;
pub mod normalize;
pub mod script;
pub mod search;
pub mod server;
pub mod stats;

#[cfg(test)]
mod test_fixtures;
