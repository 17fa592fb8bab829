//! Fast-resume blobs persisted as `<infohash>.fastresume`.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::torrent::InfoHash;

#[derive(Debug, Clone)]
pub struct ResumeStore {
    dir: PathBuf,
}

impl ResumeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, info_hash: &InfoHash) -> PathBuf {
        self.dir.join(format!("{info_hash}.fastresume"))
    }

    /// Reads the blob for `info_hash`, `None` if there is none.
    pub async fn load(&self, info_hash: &InfoHash) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(info_hash)).await {
            Ok(data) => {
                debug!("Loaded {} bytes of resume data for {}", data.len(), info_hash);
                Ok(Some(data))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn save(&self, info_hash: &InfoHash, data: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.path_for(info_hash), data).await
    }

    /// Deletes the blob. A missing blob is not an error.
    pub async fn delete(&self, info_hash: &InfoHash) -> io::Result<()> {
        match fs::remove_file(self.path_for(info_hash)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResumeStore::new(dir.path().join("resume"));
        let hash = InfoHash::new([0xab; 20]);

        assert_eq!(store.load(&hash).await.unwrap(), None);
        store.save(&hash, b"UTRS\xff").await.unwrap();
        assert!(
            store
                .path_for(&hash)
                .ends_with("abababababababababababababababababababab.fastresume")
        );
        assert_eq!(store.load(&hash).await.unwrap(), Some(b"UTRS\xff".to_vec()));

        store.delete(&hash).await.unwrap();
        store.delete(&hash).await.unwrap();
        assert_eq!(store.load(&hash).await.unwrap(), None);
    }
}
