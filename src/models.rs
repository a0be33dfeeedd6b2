//! Row and line types shared by the query modules.
//!
//! The archive is a single denormalized table, `dialogues`: one row per
//! spoken line, with the script's metadata repeated on every row.

use serde::Serialize;

/// SQL predicate every query applies: lines without text are not dialogue.
pub const HAS_DIALOGUE: &str = "dialogue IS NOT NULL AND dialogue != ''";

/// A matching row from the keyword query.
#[derive(Debug, Clone)]
pub struct DialogueRow {
    pub script_name: String,
    pub script_url: String,
    pub character: String,
    pub dialogue: String,
    pub row_number: i64,
    pub release_date: String,
    pub youtube_title: String,
    pub youtube_url: String,
}

/// One spoken line as embedded in responses.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DialogueLine {
    pub character: String,
    pub dialogue: String,
    pub row_number: i64,
}
