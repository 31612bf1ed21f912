use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most recent reading position for one manga, as shown in the history list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
  pub manga_id: String,
  pub manga_title: String,
  pub cover_image: String,
  pub chapter_id: String,
  pub chapter_number: f64,
  pub chapter_title: String,
  /// Zero-based page index
  pub current_page: u32,
  pub last_read: DateTime<Utc>,
}

/// Where to resume reading a manga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
  pub manga_id: String,
  pub chapter_id: String,
  pub chapter_number: f64,
  pub current_page: u32,
  pub last_read: DateTime<Utc>,
}

/// A chapter/page view reported by the reader.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterView<'a> {
  pub manga_id: &'a str,
  pub manga_title: &'a str,
  pub cover_image: &'a str,
  pub chapter_id: &'a str,
  pub chapter_number: f64,
  pub chapter_title: &'a str,
  pub page: u32,
}
