//! Saving a whole chapter to disk, one file per page.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use color_eyre::{eyre::eyre, Result};
use tracing::{debug, info, warn};

use super::client::MangaClient;
use super::types::Chapter;
use crate::fetch::Fetcher;

const DEFAULT_EXTENSION: &str = "jpg";

/// Where the bytes of a page come from.
#[derive(Debug, PartialEq, Eq)]
pub enum PageSource<'a> {
  /// Embedded in the chapter itself, base64 encoded
  Inline { extension: &'a str, data: &'a str },
  /// Loaded over the network (remote images through the backend proxy)
  Fetched(&'a str),
}

impl<'a> PageSource<'a> {
  /// Classify a page reference. The backend hands out `data:` URLs, bare
  /// base64 JPEG data, or remote image URLs.
  pub fn of(reference: &'a str) -> Self {
    if let Some(rest) = reference.strip_prefix("data:") {
      if let Some((meta, data)) = rest.split_once(',') {
        if let Some(mime) = meta.strip_suffix(";base64") {
          return PageSource::Inline {
            extension: mime_extension(mime),
            data,
          };
        }
      }
      return PageSource::Fetched(reference);
    }

    let lower = reference.get(..8).unwrap_or(reference).to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
      return PageSource::Fetched(reference);
    }

    if STANDARD.decode(reference).is_ok() {
      PageSource::Inline {
        extension: DEFAULT_EXTENSION,
        data: reference,
      }
    } else {
      PageSource::Fetched(reference)
    }
  }
}

fn mime_extension(mime: &str) -> &str {
  match mime.strip_prefix("image/") {
    Some("jpeg") => "jpg",
    Some("svg+xml") => "svg",
    Some(subtype) if !subtype.is_empty() && subtype.chars().all(|c| c.is_ascii_alphanumeric()) => {
      subtype
    }
    _ => DEFAULT_EXTENSION,
  }
}

/// Extension of the last path segment of a URL, `jpg` when there is none.
fn url_extension(reference: &str) -> &str {
  let path = reference
    .split(|c: char| c == '?' || c == '#')
    .next()
    .unwrap_or(reference);
  let last = path.rsplit('/').next().unwrap_or(path);
  match last.rsplit_once('.') {
    Some((_, ext))
      if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
    {
      ext
    }
    _ => DEFAULT_EXTENSION,
  }
}

/// File name for the page at a zero-based index: `page_001.jpg`, ...
pub fn page_file_name(index: usize, reference: &str) -> String {
  let extension = match PageSource::of(reference) {
    PageSource::Inline { extension, .. } => extension,
    PageSource::Fetched(url) => url_extension(url),
  };
  format!("page_{:03}.{}", index + 1, extension)
}

/// What a chapter download produced.
#[derive(Debug, Default)]
pub struct DownloadReport {
  pub saved: Vec<PathBuf>,
  /// One-based numbers of the pages that could not be saved
  pub failed: Vec<usize>,
}

impl<F: Fetcher> MangaClient<F> {
  /// Write every page of a chapter into `dir`.
  ///
  /// Pages that fail are logged and skipped. Fetched pages go through the
  /// interceptor chain like any other image, so they also land in the image
  /// cache.
  pub async fn download_chapter(&self, chapter: &Chapter, dir: &Path) -> Result<DownloadReport> {
    tokio::fs::create_dir_all(dir)
      .await
      .map_err(|e| eyre!("Failed to create {}: {}", dir.display(), e))?;

    let mut report = DownloadReport::default();
    for (index, reference) in chapter.pages.iter().enumerate() {
      let path = dir.join(page_file_name(index, reference));
      match self.save_page(reference, &path).await {
        Ok(()) => {
          debug!(page = index + 1, path = %path.display(), "Saved page");
          report.saved.push(path);
        }
        Err(e) => {
          warn!(chapter_id = %chapter.id, page = index + 1, error = %e, "Failed to download page");
          report.failed.push(index + 1);
        }
      }
    }

    info!(
      chapter_id = %chapter.id,
      saved = report.saved.len(),
      failed = report.failed.len(),
      "Chapter downloaded"
    );
    Ok(report)
  }

  async fn save_page(&self, reference: &str, path: &Path) -> Result<()> {
    let body = match PageSource::of(reference) {
      PageSource::Inline { data, .. } => STANDARD
        .decode(data)
        .map_err(|e| eyre!("Invalid inline image data: {}", e))?,
      PageSource::Fetched(url) => self.fetch_image(url).await?.bytes(),
    };

    tokio::fs::write(path, body)
      .await
      .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))
  }
}
