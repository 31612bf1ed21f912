//! Local reading ledger: history of opened manga and where to resume each one.
//!
//! Records are stored as JSON strings in a key/value table, history under one
//! global key and progress under one key per manga.

mod kv;
mod store;
mod types;

pub use kv::SqliteKv;
pub use store::ProgressStore;
pub use types::ChapterView;
