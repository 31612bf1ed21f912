//! Commands a host can post to the worker, and the worker's replies.

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
  /// Drop the image generation
  ClearCache,
}

impl WorkerMessage {
  /// Parse a posted JSON message. Anything unrecognized is ignored.
  pub fn parse(raw: &str) -> Option<Self> {
    match serde_json::from_str(raw) {
      Ok(message) => Some(message),
      Err(e) => {
        debug!(error = %e, "Ignoring unrecognized worker message");
        None
      }
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReply {
  pub success: bool,
}
