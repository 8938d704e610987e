use crate::badge_rpc::db_ops::PhotoRepo;
use crate::error::{BadgeError, BadgeResult};
use async_trait::async_trait;
use image::ImageFormat;
use log::info;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Largest accepted photo (5 MiB)
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

// PhotoOp and PhotoRepo have the same methods in current implementation
pub trait PhotoOp: PhotoRepo {}
impl<T> PhotoOp for T where T: PhotoRepo {}

/// Image formats a badge photo may use, detected from content
fn accepted_extension(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("png"),
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::WebP => Some("webp"),
        _ => None,
    }
}

/// Content type served for a stored photo id, `None` for ids this store never issues
pub fn content_type(photo_id: &str) -> Option<&'static str> {
    let (stem, ext) = photo_id.rsplit_once('.')?;
    Uuid::parse_str(stem).ok()?;
    match ext {
        "png" => Some("image/png"),
        "jpg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Public address of a stored photo
pub fn photo_url(public_base_url: &str, photo_id: &str) -> String {
    format!("{}/photos/{}", public_base_url.trim_end_matches('/'), photo_id)
}

/// Check an upload and derive its content addressed id,
/// identical bytes always map to the same id
pub fn photo_id_for(data: &[u8]) -> BadgeResult<String> {
    if data.is_empty() {
        return Err(BadgeError::validation("photo is empty"));
    }
    if data.len() > MAX_PHOTO_BYTES {
        return Err(BadgeError::validation(format!(
            "photo too large: {} bytes (max {})",
            data.len(),
            MAX_PHOTO_BYTES
        )));
    }
    let format = image::guess_format(data)
        .map_err(|e| BadgeError::validation(format!("photo is not an image: {}", e)))?;
    let ext = accepted_extension(format).ok_or_else(|| {
        BadgeError::validation(format!(
            "unsupported photo format {:?}, use png, jpeg or webp",
            format
        ))
    })?;
    Ok(format!("{}.{}", Uuid::new_v5(&Uuid::NAMESPACE_OID, data), ext))
}

/// Validate, store unless already present and return the public url
pub async fn upload_photo(
    store: &(dyn PhotoOp + Send + Sync),
    data: Vec<u8>,
    public_base_url: &str,
) -> BadgeResult<String> {
    let photo_id = photo_id_for(&data)?;
    if store.has_photo(photo_id.clone()).await? {
        info!("photo {} already stored", photo_id);
    } else {
        let size = data.len();
        store.store_photo(photo_id.clone(), data).await?;
        info!("photo {} stored ({} bytes)", photo_id, size);
    }
    Ok(photo_url(public_base_url, &photo_id))
}

/// Use files to persist photos
pub struct FsPhotoStore {
    root: PathBuf,
}

impl FsPhotoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsPhotoStore { root: root.into() }
    }

    /// Only ids minted by `photo_id_for` resolve, anything else could escape the root
    fn path_of(&self, photo_id: &str) -> BadgeResult<PathBuf> {
        content_type(photo_id)
            .map(|_| self.root.join(photo_id))
            .ok_or_else(|| BadgeError::not_found(format!("photo {}", photo_id)))
    }
}

fn io_err(path: &Path, e: std::io::Error) -> BadgeError {
    BadgeError::storage(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl PhotoRepo for FsPhotoStore {
    async fn has_photo(&self, photo_id: String) -> BadgeResult<bool> {
        Ok(self.path_of(&photo_id)?.is_file())
    }

    async fn get_photo(&self, photo_id: String) -> BadgeResult<Vec<u8>> {
        let path = self.path_of(&photo_id)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => BadgeError::not_found(format!("photo {}", photo_id)),
            _ => io_err(&path, e),
        })
    }

    async fn store_photo(&self, photo_id: String, data: Vec<u8>) -> BadgeResult<String> {
        let path = self.path_of(&photo_id)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_err(&self.root, e))?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| io_err(&path, e))?;
        Ok(photo_id)
    }
}

/// Use database to persist photos
pub struct DbPhotoStore {
    photo_repo: Arc<dyn PhotoRepo + Send + Sync>,
}

impl DbPhotoStore {
    pub fn new(photo_repo: Arc<dyn PhotoRepo + Send + Sync>) -> Self {
        DbPhotoStore { photo_repo }
    }
}

#[async_trait]
impl PhotoRepo for DbPhotoStore {
    async fn has_photo(&self, photo_id: String) -> BadgeResult<bool> {
        self.photo_repo.has_photo(photo_id).await
    }

    async fn get_photo(&self, photo_id: String) -> BadgeResult<Vec<u8>> {
        self.photo_repo.get_photo(photo_id).await
    }

    async fn store_photo(&self, photo_id: String, data: Vec<u8>) -> BadgeResult<String> {
        self.photo_repo.store_photo(photo_id, data).await
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{jpeg, png, webp};
    use super::*;
    use crate::badge_rpc::db_ops::fixtures::memory_db;
    use crate::badge_rpc::db_ops::DbOpsImpl;

    #[test]
    fn detects_format_from_content() {
        assert!(photo_id_for(&png()).unwrap().ends_with(".png"));
        assert!(photo_id_for(&jpeg()).unwrap().ends_with(".jpg"));
        assert!(photo_id_for(&webp()).unwrap().ends_with(".webp"));
        assert_eq!(photo_id_for(&png()).unwrap(), photo_id_for(&png()).unwrap());
    }

    #[test]
    fn rejects_non_images_and_oversized() {
        assert!(photo_id_for(b"").unwrap_err().is_validation());
        assert!(photo_id_for(b"hello world, not an image").unwrap_err().is_validation());
        assert!(photo_id_for(b"GIF89a\x01\x00\x01\x00\x00\x00\x00")
            .unwrap_err()
            .is_validation());

        let mut big = png();
        big.resize(MAX_PHOTO_BYTES + 1, 0);
        assert!(photo_id_for(&big).unwrap_err().is_validation());
    }

    #[test]
    fn content_type_only_for_minted_ids() {
        let id = photo_id_for(&jpeg()).unwrap();
        assert_eq!(content_type(&id), Some("image/jpeg"));
        assert_eq!(content_type("../etc/passwd"), None);
        assert_eq!(content_type("x.png"), None);
    }

    #[tokio::test]
    async fn fs_store_dedupes_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPhotoStore::new(dir.path().join("photos"));

        let first = upload_photo(&store, png(), "http://badges.local/").await.unwrap();
        let second = upload_photo(&store, png(), "http://badges.local").await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("http://badges.local/photos/"));

        let id = first.rsplit('/').next().unwrap().to_owned();
        assert!(store.has_photo(id.clone()).await.unwrap());
        assert_eq!(store.get_photo(id).await.unwrap(), png());
        assert_eq!(std::fs::read_dir(dir.path().join("photos")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn fs_store_refuses_foreign_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPhotoStore::new(dir.path());
        assert!(store
            .get_photo("../secret.png".to_owned())
            .await
            .unwrap_err()
            .is_not_found());
        let missing = format!("{}.png", Uuid::new_v4());
        assert!(store.get_photo(missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn db_store_round_trips() {
        let store = DbPhotoStore::new(Arc::new(DbOpsImpl::new(memory_db().await)));
        let url = upload_photo(&store, webp(), "http://badges.local").await.unwrap();
        let id = url.rsplit('/').next().unwrap().to_owned();
        assert_eq!(store.get_photo(id).await.unwrap(), webp());
        upload_photo(&store, webp(), "http://badges.local").await.unwrap();
    }
}
