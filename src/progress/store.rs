//! Reading history and per-manga progress.
//!
//! No operation here returns an error: unreadable data reads as absent and
//! failed writes are logged. History and progress are separate keys and are
//! written one after the other without a transaction, so an interrupted
//! `update_history` can leave them out of step until the next write.

use chrono::Utc;
use tracing::error;

use super::kv::KeyValueStore;
use super::types::{ChapterView, HistoryItem, ProgressRecord};

const HISTORY_KEY: &str = "manga_reading_history";
const PROGRESS_KEY: &str = "manga_reading_progress";

/// Maximum number of history items kept.
pub const HISTORY_LIMIT: usize = 50;

fn progress_key(manga_id: &str) -> String {
  format!("{}_{}", PROGRESS_KEY, manga_id)
}

pub struct ProgressStore<K: KeyValueStore> {
  kv: K,
}

impl<K: KeyValueStore> ProgressStore<K> {
  pub fn new(kv: K) -> Self {
    Self { kv }
  }

  /// History items, most recent first. Empty when missing or unreadable.
  pub fn get_history(&self) -> Vec<HistoryItem> {
    let raw = match self.kv.get(HISTORY_KEY) {
      Ok(Some(raw)) => raw,
      Ok(None) => return Vec::new(),
      Err(e) => {
        error!(error = %e, "Failed to get history");
        return Vec::new();
      }
    };

    serde_json::from_str(&raw).unwrap_or_else(|e| {
      error!(error = %e, "Failed to parse history");
      Vec::new()
    })
  }

  /// Record a chapter/page view.
  ///
  /// Replaces the manga's existing item in place, or inserts a new one at the
  /// front, keeps the first `HISTORY_LIMIT` items, then updates progress.
  pub fn update_history(&self, view: &ChapterView<'_>) {
    let mut history = self.get_history();

    let item = HistoryItem {
      manga_id: view.manga_id.to_string(),
      manga_title: view.manga_title.to_string(),
      cover_image: view.cover_image.to_string(),
      chapter_id: view.chapter_id.to_string(),
      chapter_number: view.chapter_number,
      chapter_title: view.chapter_title.to_string(),
      current_page: view.page,
      last_read: Utc::now(),
    };

    match history.iter().position(|h| h.manga_id == view.manga_id) {
      Some(index) => history[index] = item,
      None => history.insert(0, item),
    }
    history.truncate(HISTORY_LIMIT);

    if let Err(e) = self.write_history(&history) {
      error!(manga_id = view.manga_id, error = %e, "Failed to update history");
      return;
    }

    self.update_progress(view.manga_id, view.chapter_id, view.chapter_number, view.page);
  }

  /// Drop one manga from history. Its progress record stays.
  pub fn remove_from_history(&self, manga_id: &str) {
    let mut history = self.get_history();
    history.retain(|h| h.manga_id != manga_id);

    if let Err(e) = self.write_history(&history) {
      error!(manga_id, error = %e, "Failed to remove from history");
    }
  }

  pub fn clear_history(&self) {
    if let Err(e) = self.kv.remove(HISTORY_KEY) {
      error!(error = %e, "Failed to clear history");
    }
  }

  pub fn get_progress(&self, manga_id: &str) -> Option<ProgressRecord> {
    let raw = match self.kv.get(&progress_key(manga_id)) {
      Ok(raw) => raw?,
      Err(e) => {
        error!(manga_id, error = %e, "Failed to get progress");
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(record) => Some(record),
      Err(e) => {
        error!(manga_id, error = %e, "Failed to parse progress");
        None
      }
    }
  }

  /// Overwrite the progress record for a manga with a fresh timestamp.
  pub fn update_progress(&self, manga_id: &str, chapter_id: &str, chapter_number: f64, page: u32) {
    let record = ProgressRecord {
      manga_id: manga_id.to_string(),
      chapter_id: chapter_id.to_string(),
      chapter_number,
      current_page: page,
      last_read: Utc::now(),
    };

    let result = serde_json::to_string(&record)
      .map_err(color_eyre::Report::from)
      .and_then(|raw| self.kv.set(&progress_key(manga_id), &raw));

    if let Err(e) = result {
      error!(manga_id, error = %e, "Failed to update progress");
    }
  }

  pub fn clear_progress(&self, manga_id: &str) {
    if let Err(e) = self.kv.remove(&progress_key(manga_id)) {
      error!(manga_id, error = %e, "Failed to clear progress");
    }
  }

  fn write_history(&self, history: &[HistoryItem]) -> color_eyre::Result<()> {
    let raw = serde_json::to_string(history)?;
    self.kv.set(HISTORY_KEY, &raw)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use crate::progress::kv::SqliteKv;
  use color_eyre::eyre::eyre;
  use std::sync::Arc;

  fn store() -> ProgressStore<SqliteKv> {
    ProgressStore::new(SqliteKv::new(Arc::new(Database::open_in_memory().unwrap())))
  }

  fn view<'a>(manga_id: &'a str, chapter_id: &'a str, chapter_number: f64, page: u32) -> ChapterView<'a> {
    ChapterView {
      manga_id,
      manga_title: "Title A",
      cover_image: "data:image/png;base64,AAAA",
      chapter_id,
      chapter_number,
      chapter_title: "Ch1",
      page,
    }
  }

  #[test]
  fn test_update_history_records_progress() {
    let store = store();
    store.update_history(&view("m1", "c1", 1.0, 3));

    let progress = store.get_progress("m1").unwrap();
    assert_eq!(progress.manga_id, "m1");
    assert_eq!(progress.chapter_id, "c1");
    assert_eq!(progress.chapter_number, 1.0);
    assert_eq!(progress.current_page, 3);
    assert!(progress.last_read <= Utc::now());
  }

  #[test]
  fn test_same_manga_twice_keeps_one_item() {
    let store = store();
    store.update_history(&view("m1", "c1", 1.0, 3));
    store.update_history(&view("m1", "c2", 2.0, 7));

    let history = store.get_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].chapter_id, "c2");
    assert_eq!(history[0].current_page, 7);
    assert_eq!(store.get_progress("m1").unwrap().chapter_id, "c2");
  }

  #[test]
  fn test_new_items_go_to_the_front_and_existing_stay_in_place() {
    let store = store();
    store.update_history(&view("m1", "c1", 1.0, 0));
    store.update_history(&view("m2", "c1", 1.0, 0));
    store.update_history(&view("m1", "c2", 2.0, 4));

    let ids: Vec<_> = store.get_history().into_iter().map(|h| h.manga_id).collect();
    assert_eq!(ids, vec!["m2", "m1"]);
  }

  #[test]
  fn test_history_is_bounded_to_fifty() {
    let store = store();
    for i in 0..=HISTORY_LIMIT {
      let id = format!("m{}", i);
      store.update_history(&view(&id, "c1", 1.0, 0));
    }

    let history = store.get_history();
    assert_eq!(history.len(), HISTORY_LIMIT);
    assert_eq!(history[0].manga_id, "m50");
    assert_eq!(history[HISTORY_LIMIT - 1].manga_id, "m1");
    assert!(history.iter().all(|h| h.manga_id != "m0"));
  }

  #[test]
  fn test_remove_from_history_keeps_progress() {
    let store = store();
    store.update_history(&view("m1", "c1", 1.0, 3));
    store.update_history(&view("m2", "c9", 9.5, 1));

    store.remove_from_history("m1");
    store.remove_from_history("m1");

    let ids: Vec<_> = store.get_history().into_iter().map(|h| h.manga_id).collect();
    assert_eq!(ids, vec!["m2"]);
    assert_eq!(store.get_progress("m1").unwrap().current_page, 3);
  }

  #[test]
  fn test_clear_history() {
    let store = store();
    store.update_history(&view("m1", "c1", 1.0, 3));
    store.clear_history();

    assert!(store.get_history().is_empty());
    assert!(store.get_progress("m1").is_some());
  }

  #[test]
  fn test_clear_progress_is_per_manga() {
    let store = store();
    store.update_progress("m1", "c1", 1.0, 2);
    store.update_progress("m2", "c4", 4.0, 8);

    store.clear_progress("m1");

    assert!(store.get_progress("m1").is_none());
    assert_eq!(store.get_progress("m2").unwrap().current_page, 8);
  }

  #[test]
  fn test_corrupt_data_reads_as_empty() {
    let kv = SqliteKv::new(Arc::new(Database::open_in_memory().unwrap()));
    kv.set(HISTORY_KEY, "{not json").unwrap();
    kv.set(&progress_key("m1"), "[1,2").unwrap();
    let store = ProgressStore::new(kv);

    assert!(store.get_history().is_empty());
    assert!(store.get_progress("m1").is_none());

    // the next write replaces the corrupt ledger
    store.update_history(&view("m1", "c1", 1.0, 0));
    assert_eq!(store.get_history().len(), 1);
  }

  #[test]
  fn test_reads_records_written_by_the_web_client() {
    let kv = SqliteKv::new(Arc::new(Database::open_in_memory().unwrap()));
    kv.set(
      &progress_key("m1"),
      r#"{"mangaId":"m1","chapterId":"c1","chapterNumber":12,"currentPage":5,"lastRead":"2024-05-01T10:20:30.123Z"}"#,
    )
    .unwrap();
    let store = ProgressStore::new(kv);

    let record = store.get_progress("m1").unwrap();
    assert_eq!(record.chapter_number, 12.0);
    assert_eq!(record.current_page, 5);
  }

  struct UnavailableKv;

  impl KeyValueStore for UnavailableKv {
    fn get(&self, _key: &str) -> color_eyre::Result<Option<String>> {
      Err(eyre!("storage disabled"))
    }

    fn set(&self, _key: &str, _value: &str) -> color_eyre::Result<()> {
      Err(eyre!("quota exceeded"))
    }

    fn remove(&self, _key: &str) -> color_eyre::Result<()> {
      Err(eyre!("storage disabled"))
    }
  }

  #[test]
  fn test_unavailable_storage_never_panics() {
    let store = ProgressStore::new(UnavailableKv);
    store.update_history(&view("m1", "c1", 1.0, 3));
    store.remove_from_history("m1");
    store.clear_history();
    store.clear_progress("m1");

    assert!(store.get_history().is_empty());
    assert!(store.get_progress("m1").is_none());
  }
}
