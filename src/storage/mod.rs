mod local_fs;

pub use local_fs::LocalFileStorage;

use crate::errors::ApiError;
use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use uuid::Uuid;

/// Flat, filename-addressed store for uploaded images.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Opens a new, empty file. Fails if `filename` is already taken.
    async fn create(&self, filename: &str) -> Result<File, ApiError>;
    async fn read(&self, filename: &str) -> Result<Vec<u8>, ApiError>;
    async fn delete(&self, filename: &str) -> Result<(), ApiError>;
    /// Directory the static image route serves from.
    fn root(&self) -> &Path;
}

pub fn new_image_id() -> String {
    Uuid::new_v4().to_string()
}

/// Extension of the last path component, leading dot included.
///
/// Mirrors the common `extname` rules: `photo.JPG` gives `.JPG`, `archive.tar.gz`
/// gives `.gz`, `photo.` and `...` give `.`, `..png` gives `.png`, while
/// `photo`, `.bashrc` and `..` give nothing.
pub fn extension_of(original_name: &str) -> &str {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);

    match base.rfind('.') {
        None | Some(0) => "",
        Some(_) if base == ".." => "",
        Some(idx) => &base[idx..],
    }
}

pub fn stored_filename(id: &str, original_name: &str) -> String {
    format!("{id}{}", extension_of(original_name))
}
