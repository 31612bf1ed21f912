//! Which caching strategy a request gets.

use crate::http::{Destination, Request};

/// Raster and vector formats served by the backend and by external hosts.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Images: serve the cached copy when there is one
  CacheFirst,
  /// Everything else: go to the network, use the cache only when offline
  NetworkFirst,
}

pub fn strategy_for(request: &Request) -> Strategy {
  if is_image_request(request) {
    Strategy::CacheFirst
  } else {
    Strategy::NetworkFirst
  }
}

/// An image either by declared destination or by file extension.
pub fn is_image_request(request: &Request) -> bool {
  request.destination == Destination::Image || has_image_extension(request.url.path())
}

fn has_image_extension(path: &str) -> bool {
  match path.rsplit_once('.') {
    Some((_, ext)) => IMAGE_EXTENSIONS
      .iter()
      .any(|known| known.eq_ignore_ascii_case(ext)),
    None => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn request(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  #[test]
  fn test_extension_match() {
    assert!(is_image_request(&request("http://cdn.test/covers/one.jpg")));
    assert!(is_image_request(&request("http://cdn.test/p/2.WEBP?w=800")));
    assert!(is_image_request(&request("http://cdn.test/logo.svg")));
    assert!(!is_image_request(&request("http://app.test/api/manga")));
    assert!(!is_image_request(&request("http://app.test/static/js/main.js")));
  }

  #[test]
  fn test_extension_must_be_in_last_segment() {
    assert!(!is_image_request(&request("http://app.test/img.png/details")));
    assert!(!is_image_request(&request("http://app.test/page.pngx")));
  }

  #[test]
  fn test_destination_wins_without_extension() {
    let req = request("http://app.test/api/image-proxy?url=x").with_destination(Destination::Image);
    assert!(is_image_request(&req));
    assert_eq!(strategy_for(&req), Strategy::CacheFirst);
  }

  #[test]
  fn test_documents_are_network_first() {
    let req = request("http://app.test/manga/abc").with_destination(Destination::Document);
    assert_eq!(strategy_for(&req), Strategy::NetworkFirst);
  }
}
