//! Client for the manga backend's public REST endpoints.

pub mod client;
pub mod download;
pub mod types;

pub use client::MangaClient;
pub use download::PageSource;
pub use types::Manga;
