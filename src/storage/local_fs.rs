use super::*;
use std::io;
use std::path::PathBuf;
use tokio::fs;

pub struct LocalFileStorage {
    storage_path: PathBuf,
}

impl LocalFileStorage {
    /// Opens the upload directory, creating it and any parents as needed.
    pub fn new(storage_path: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&storage_path)?;
        Ok(Self { storage_path })
    }
}

#[async_trait]
impl Storage for LocalFileStorage {
    async fn create(&self, filename: &str) -> Result<File, ApiError> {
        let file_path = self.storage_path.join(filename);
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .await?;
        Ok(file)
    }

    async fn read(&self, filename: &str) -> Result<Vec<u8>, ApiError> {
        let bytes = fs::read(self.storage_path.join(filename)).await?;
        Ok(bytes)
    }

    async fn delete(&self, filename: &str) -> Result<(), ApiError> {
        fs::remove_file(self.storage_path.join(filename)).await?;
        Ok(())
    }

    fn root(&self) -> &Path {
        &self.storage_path
    }
}
