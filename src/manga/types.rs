use serde::{Deserialize, Serialize};

/// Manga as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manga {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub author: String,
  /// Data URL or remote URL of the cover
  #[serde(default)]
  pub cover_image: String,
  #[serde(default)]
  pub genres: Vec<String>,
  #[serde(default)]
  pub status: String, // "Ongoing" or "Completed"
  pub created_at: Option<String>,
  #[serde(default)]
  pub total_chapters: u32,
}

/// Chapter as returned by the backend. `pages` is empty in chapter lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
  pub id: String,
  pub manga_id: String,
  pub chapter_number: f64,
  pub title: String,
  #[serde(default)]
  pub pages: Vec<String>,
  pub created_at: Option<String>,
}
