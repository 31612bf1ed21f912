use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use url::Url;

use crate::fetch::Fetcher;
use crate::http::{Destination, Request, Response};
use crate::intercept::InterceptingClient;
use crate::manga::types::{Chapter, Manga};

/// Backend REST client. Every call goes through the interceptor chain.
pub struct MangaClient<F: Fetcher> {
  http: InterceptingClient<F>,
  base: Url,
}

impl<F: Fetcher> MangaClient<F> {
  pub fn new(http: InterceptingClient<F>, base: Url) -> Self {
    Self { http, base }
  }

  /// Build an endpoint URL from path segments under the backend base.
  fn endpoint(&self, segments: &[&str]) -> Result<Url> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| eyre!("Backend URL cannot be a base: {}", self.base))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
    let response = self
      .http
      .send(Request::get(url).with_header("Accept", "application/json"))
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", what, e))?;

    if !response.is_success() {
      return Err(eyre!("Failed to fetch {}: status {}", what, response.status()));
    }

    response
      .json()
      .map_err(|e| eyre!("Failed to parse {}: {}", what, e))
  }

  /// List manga (paginated)
  pub async fn list_manga(&self, limit: u32, skip: u32) -> Result<Vec<Manga>> {
    let mut url = self.endpoint(&["api", "manga"])?;
    url
      .query_pairs_mut()
      .append_pair("limit", &limit.to_string())
      .append_pair("skip", &skip.to_string());
    self.get_json(url, "manga").await
  }

  pub async fn get_manga(&self, manga_id: &str) -> Result<Manga> {
    let url = self.endpoint(&["api", "manga", manga_id])?;
    self.get_json(url, "manga details").await
  }

  /// Chapters of a manga, ordered by chapter number, without pages
  pub async fn get_chapters(&self, manga_id: &str) -> Result<Vec<Chapter>> {
    let url = self.endpoint(&["api", "manga", manga_id, "chapters"])?;
    self.get_json(url, "chapters").await
  }

  /// Chapter including all pages
  pub async fn get_chapter(&self, chapter_id: &str) -> Result<Chapter> {
    let url = self.endpoint(&["api", "chapter", chapter_id])?;
    self.get_json(url, "chapter details").await
  }

  /// Search manga by title. The backend returns nothing for queries shorter
  /// than two characters.
  pub async fn search(&self, query: &str) -> Result<Vec<Manga>> {
    let mut url = self.endpoint(&["api", "search"])?;
    url.query_pairs_mut().append_pair("q", query);
    self.get_json(url, "search results").await
  }

  /// Most recently added manga
  pub async fn featured(&self, limit: u32) -> Result<Vec<Manga>> {
    let mut url = self.endpoint(&["api", "featured"])?;
    url
      .query_pairs_mut()
      .append_pair("limit", &limit.to_string());
    self.get_json(url, "featured manga").await
  }

  /// Where an image reference is loaded from. Remote images go through the
  /// backend's image proxy, anything else resolves against the backend base.
  pub fn image_url(&self, reference: &str) -> Result<Url> {
    if is_remote(reference) {
      let mut url = self.endpoint(&["api", "proxy-image"])?;
      url.query_pairs_mut().append_pair("url", reference);
      return Ok(url);
    }

    self
      .base
      .join(reference)
      .map_err(|e| eyre!("Invalid image reference {}: {}", reference, e))
  }

  /// Fetch a cover or page image.
  pub async fn fetch_image(&self, reference: &str) -> Result<Response> {
    let url = self.image_url(reference)?;

    let response = self
      .http
      .send(Request::get(url).with_destination(Destination::Image))
      .await
      .map_err(|e| eyre!("Failed to fetch image {}: {}", reference, e))?;

    if !response.is_success() {
      return Err(eyre!(
        "Failed to fetch image {}: status {}",
        reference,
        response.status()
      ));
    }
    Ok(response)
  }
}

fn is_remote(reference: &str) -> bool {
  let lower = reference.trim_start().to_ascii_lowercase();
  lower.starts_with("http://") || lower.starts_with("https://")
}
