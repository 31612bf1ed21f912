//! Named, versioned cache generations and the registry that hands them out.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use color_eyre::Result;

use super::traits::{CacheStorage, CachedEntry, Purpose, StoredResponse};
use crate::http::CacheKey;

/// Build the generation name for a purpose and version tag.
pub fn generation_name(purpose: Purpose, version: &str) -> String {
  format!("manga-{}-{}", purpose.family(), version)
}

/// Handle on one generation: its name plus the storage it lives in.
#[derive(Clone)]
pub struct Generation {
  purpose: Purpose,
  name: String,
  storage: Arc<dyn CacheStorage>,
}

impl fmt::Debug for Generation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Generation")
      .field("purpose", &self.purpose)
      .field("name", &self.name)
      .finish()
  }
}

impl Generation {
  pub fn purpose(&self) -> Purpose {
    self.purpose
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn open(&self) -> Result<()> {
    self.storage.open_generation(&self.name)
  }

  pub fn get(&self, key: &CacheKey) -> Result<Option<CachedEntry>> {
    self.storage.get(&self.name, key)
  }

  pub fn put(&self, key: &CacheKey, response: &StoredResponse) -> Result<()> {
    self.storage.put(&self.name, key, response)
  }

  pub fn delete(&self) -> Result<bool> {
    self.storage.delete_generation(&self.name)
  }
}

/// Purpose → generation map for one worker version.
///
/// Built once at startup and passed by reference to whatever needs cache
/// access.
#[derive(Clone)]
pub struct Generations {
  version: String,
  storage: Arc<dyn CacheStorage>,
  by_purpose: HashMap<Purpose, Generation>,
}

impl Generations {
  pub fn new(storage: Arc<dyn CacheStorage>, version: impl Into<String>) -> Self {
    let version = version.into();
    let by_purpose = Purpose::ALL
      .iter()
      .map(|&purpose| {
        let generation = Generation {
          purpose,
          name: generation_name(purpose, &version),
          storage: Arc::clone(&storage),
        };
        (purpose, generation)
      })
      .collect();

    Self {
      version,
      storage,
      by_purpose,
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn storage(&self) -> &Arc<dyn CacheStorage> {
    &self.storage
  }

  pub fn get(&self, purpose: Purpose) -> &Generation {
    // every purpose is inserted in new()
    &self.by_purpose[&purpose]
  }

  /// Generations that survive activation. The dynamic generation is not
  /// among them.
  pub fn is_retained(&self, name: &str) -> bool {
    name == self.get(Purpose::Static).name() || name == self.get(Purpose::Images).name()
  }

  pub fn all_names(&self) -> Result<Vec<String>> {
    self.storage.generation_names()
  }
}
