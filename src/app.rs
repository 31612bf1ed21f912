use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{CacheStorage, Generations, SqliteStorage};
use crate::config::Config;
use crate::db::Database;
use crate::fetch::NetworkFetcher;
use crate::http::{Destination, Request};
use crate::intercept::InterceptingClient;
use crate::manga::{Manga, MangaClient, PageSource};
use crate::progress::{ChapterView, ProgressStore, SqliteKv};
use crate::worker::{self, OfflineWorker, Registration, WorkerMessage};
use crate::{Command, HistoryAction};

/// Wires the offline worker, the backend client and the reading ledger
/// together, the way the web client's page does.
pub struct App {
  http: InterceptingClient<NetworkFetcher>,
  manga: MangaClient<NetworkFetcher>,
  worker: Option<Arc<OfflineWorker<NetworkFetcher>>>,
  progress: ProgressStore<SqliteKv>,
}

impl App {
  pub async fn new(config: Config, force_install: bool) -> Result<Self> {
    let db = Arc::new(open_database(&config.database_path()?)?);
    let network = NetworkFetcher::new()?;
    let http = InterceptingClient::new(network.clone());

    let worker = if config.cache.enabled {
      let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::new(Arc::clone(&db)));
      let worker = Arc::new(OfflineWorker::new(
        network,
        Generations::new(storage, config.cache.version.clone()),
        config.origin.clone(),
        config.cache.static_assets.clone(),
      ));

      match worker::register(Arc::clone(&worker), &http, force_install).await {
        Registration::Installed { deleted } => {
          info!(deleted = deleted.len(), "Offline worker installed");
          Some(worker)
        }
        Registration::Resumed => Some(worker),
        Registration::Failed => None,
      }
    } else {
      None
    };

    let manga = MangaClient::new(http.clone(), config.backend_url.clone());
    let progress = ProgressStore::new(SqliteKv::new(db));

    Ok(Self {
      http,
      manga,
      worker,
      progress,
    })
  }

  fn worker(&self) -> Result<&OfflineWorker<NetworkFetcher>> {
    self
      .worker
      .as_deref()
      .ok_or_else(|| eyre!("The offline cache is disabled or failed to register"))
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Install => {
        let worker = self.worker()?;
        println!("Offline worker {} {:?}", worker.version(), worker.state().await);
      }
      Command::Generations => self.print_generations()?,
      Command::ClearCache => {
        let reply = self.worker()?.post_message(WorkerMessage::ClearCache).await?;
        if !reply.success {
          return Err(eyre!("Failed to clear the image cache"));
        }
        println!("Image cache cleared");
      }
      Command::PostMessage { message } => match self.worker()?.post_json(&message).await? {
        Some(reply) => println!("{}", reply),
        None => eprintln!("Message ignored by the offline worker"),
      },
      Command::Fetch { url, image, output } => self.fetch(&url, image, output).await?,
      Command::List { limit, skip } => print_manga_list(&self.manga.list_manga(limit, skip).await?),
      Command::Search { query } => print_manga_list(&self.manga.search(&query).await?),
      Command::Featured { limit } => print_manga_list(&self.manga.featured(limit).await?),
      Command::Manga { id } => {
        let manga = self.manga.get_manga(&id).await?;
        println!("{} by {} [{}]", manga.title, manga.author, manga.status);
        println!("{} chapters, genres: {}", manga.total_chapters, manga.genres.join(", "));
        if !manga.description.is_empty() {
          println!("\n{}", manga.description);
        }
        if let Some(progress) = self.progress.get_progress(&id) {
          println!(
            "\nContinue: chapter {} page {}",
            progress.chapter_number,
            progress.current_page + 1
          );
        }
      }
      Command::Chapters { manga_id } => {
        for chapter in self.manga.get_chapters(&manga_id).await? {
          println!("{}\t{}\t{}", chapter.id, chapter.chapter_number, chapter.title);
        }
      }
      Command::Read { chapter_id, page } => self.read(&chapter_id, page).await?,
      Command::Download { chapter_id, output } => self.download(&chapter_id, output).await?,
      Command::History { action } => match action {
        None => self.print_history(),
        Some(HistoryAction::Remove { manga_id }) => self.progress.remove_from_history(&manga_id),
        Some(HistoryAction::Clear) => self.progress.clear_history(),
      },
      Command::Progress { manga_id, clear } => {
        if clear {
          self.progress.clear_progress(&manga_id);
        } else {
          match self.progress.get_progress(&manga_id) {
            Some(p) => println!(
              "{}\tchapter {} ({})\tpage {}\t{}",
              p.manga_id,
              p.chapter_number,
              p.chapter_id,
              p.current_page + 1,
              p.last_read.to_rfc3339()
            ),
            None => println!("No progress recorded for {}", manga_id),
          }
        }
      }
    }
    Ok(())
  }

  fn print_generations(&self) -> Result<()> {
    let worker = self.worker()?;
    let generations = worker.generations();
    for name in generations.all_names()? {
      let count = generations.storage().entry_count(&name)?;
      println!("{}\t{} entries", name, count);
    }
    Ok(())
  }

  async fn fetch(&self, url: &str, image: bool, output: Option<PathBuf>) -> Result<()> {
    let url = url::Url::parse(url).map_err(|e| eyre!("Invalid URL {}: {}", url, e))?;
    let mut request = Request::get(url);
    if image {
      request = request.with_destination(Destination::Image);
    }

    let response = self.http.send(request).await?;
    eprintln!(
      "{} {} ({} bytes)",
      response.status(),
      response.header("content-type").unwrap_or("-"),
      response.content_length()
    );

    let body = response.bytes();
    match output {
      Some(path) => std::fs::write(&path, &body)
        .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
      None => std::io::stdout().write_all(&body)?,
    }
    Ok(())
  }

  async fn read(&self, chapter_id: &str, page: u32) -> Result<()> {
    let chapter = self.manga.get_chapter(chapter_id).await?;
    if !chapter.pages.is_empty() && page as usize >= chapter.pages.len() {
      return Err(eyre!(
        "Chapter {} has {} pages, page index {} is out of range",
        chapter.chapter_number,
        chapter.pages.len(),
        page
      ));
    }

    let manga = self.manga.get_manga(&chapter.manga_id).await?;

    // Warm the image cache for the page being read
    if let Some(PageSource::Fetched(reference)) = chapter.pages.get(page as usize).map(|p| PageSource::of(p)) {
      if let Err(e) = self.manga.fetch_image(reference).await {
        warn!(chapter_id, page, error = %e, "Failed to load page image");
      }
    }

    self.progress.update_history(&ChapterView {
      manga_id: &manga.id,
      manga_title: &manga.title,
      cover_image: &manga.cover_image,
      chapter_id: &chapter.id,
      chapter_number: chapter.chapter_number,
      chapter_title: &chapter.title,
      page,
    });

    println!(
      "{} - chapter {} {} - page {}/{}",
      manga.title,
      chapter.chapter_number,
      chapter.title,
      page + 1,
      chapter.pages.len()
    );
    Ok(())
  }

  async fn download(&self, chapter_id: &str, output: Option<PathBuf>) -> Result<()> {
    let chapter = self.manga.get_chapter(chapter_id).await?;
    let dir = output.unwrap_or_else(|| PathBuf::from(format!("manga_chapter_{}", chapter_id)));

    let report = self.manga.download_chapter(&chapter, &dir).await?;
    println!(
      "Saved {} of {} pages to {}",
      report.saved.len(),
      chapter.pages.len(),
      dir.display()
    );
    if !report.failed.is_empty() {
      let pages: Vec<String> = report.failed.iter().map(|p| p.to_string()).collect();
      eprintln!("Failed pages: {}", pages.join(", "));
    }
    Ok(())
  }

  fn print_history(&self) {
    let history = self.progress.get_history();
    if history.is_empty() {
      println!("No reading history");
      return;
    }
    for item in history {
      println!(
        "{}\t{}\tchapter {} {}\tpage {}\t{}",
        item.manga_id,
        item.manga_title,
        item.chapter_number,
        item.chapter_title,
        item.current_page + 1,
        item.last_read.to_rfc3339()
      );
    }
  }

  /// Wait for background cache writes.
  pub async fn shutdown(&self) {
    if let Some(worker) = &self.worker {
      worker.settle().await;
    }
  }
}

fn print_manga_list(list: &[Manga]) {
  for manga in list {
    println!("{}\t{}\t{} chapters", manga.id, manga.title, manga.total_chapters);
  }
}

/// Open the application database, falling back to a throwaway in-memory one
/// so that commands still run when the data directory is unusable.
fn open_database(path: &Path) -> Result<Database> {
  match Database::open(path) {
    Ok(db) => Ok(db),
    Err(e) => {
      warn!(path = %path.display(), error = %e, "Database unavailable, nothing will persist");
      Database::open_in_memory()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unusable_database_path_falls_back_to_memory() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();

    let db = open_database(&blocker.join("mangashelf.db")).unwrap();
    let progress = ProgressStore::new(SqliteKv::new(Arc::new(db)));
    progress.update_history(&ChapterView {
      manga_id: "m1",
      manga_title: "Title A",
      cover_image: "",
      chapter_id: "c1",
      chapter_number: 1.0,
      chapter_title: "Start",
      page: 4,
    });

    assert_eq!(progress.get_history().len(), 1);
    assert_eq!(progress.get_progress("m1").map(|p| p.current_page), Some(4));
  }

  #[test]
  fn test_database_opens_at_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("mangashelf.db");

    open_database(&path).unwrap();
    assert!(path.exists());
  }
}
