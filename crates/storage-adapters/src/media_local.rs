//! # Local media store
//!
//! Filesystem implementation of `MediaStore`. Uploads are content-addressed
//! by SHA-256 and sharded into `ab/cd/` directories, so identical images are
//! stored once and always get the same URL.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use domains::{AppError, MediaStore, Result};
use mime::Mime;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, error};

pub struct LocalMediaStore {
    /// Root directory for all uploads (e.g., "./uploads")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/uploads")
    url_prefix: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root_path: root.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_owned(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// "ab/cd/abcdef....png"
    fn relative_path(hash: &str, extension: &str) -> String {
        format!("{}/{}/{}.{}", &hash[0..2], &hash[2..4], hash, extension)
    }
}

fn extension_for(content_type: &Mime) -> &'static str {
    match (content_type.type_(), content_type.subtype().as_str()) {
        (mime::IMAGE, "jpeg") => "jpg",
        (mime::IMAGE, "png") => "png",
        (mime::IMAGE, "gif") => "gif",
        (mime::IMAGE, "webp") => "webp",
        _ => mime_guess::get_mime_extensions(content_type)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin"),
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn save_upload(&self, data: Bytes, content_type: &Mime) -> Result<String> {
        let hash = hex::encode(Sha256::digest(&data));
        let relative = Self::relative_path(&hash, extension_for(content_type));
        let target = self.root_path.join(&relative);

        let upload_failed = |err: std::io::Error| {
            error!(path = %target.display(), %err, "failed to store upload");
            AppError::UploadFailed(err.to_string())
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(upload_failed)?;
        }
        if fs::try_exists(&target).await.map_err(upload_failed)? {
            debug!(%hash, "upload already stored");
        } else {
            fs::write(&target, &data).await.map_err(upload_failed)?;
            debug!(%hash, size = data.len(), "upload written");
        }

        Ok(format!("{}/{}", self.url_prefix, relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_is_content_addressed_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path(), "/uploads/");
        let data = Bytes::from_static(b"\x89PNG\r\n\x1a\nfake");

        let url = store.save_upload(data.clone(), &mime::IMAGE_PNG).await.unwrap();
        let again = store.save_upload(data.clone(), &mime::IMAGE_PNG).await.unwrap();
        assert_eq!(url, again);

        let hash = hex::encode(Sha256::digest(&data));
        assert_eq!(url, format!("/uploads/{}/{}/{}.png", &hash[0..2], &hash[2..4], hash));

        let on_disk = dir.path().join(format!("{}/{}/{}.png", &hash[0..2], &hash[2..4], hash));
        assert_eq!(std::fs::read(on_disk).unwrap(), data.to_vec());
    }

    #[tokio::test]
    async fn jpeg_gets_a_jpg_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path(), "/media");
        let url = store
            .save_upload(Bytes::from_static(b"\xff\xd8\xff"), &mime::IMAGE_JPEG)
            .await
            .unwrap();
        assert!(url.starts_with("/media/"));
        assert!(url.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn unwritable_root_is_an_upload_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let store = LocalMediaStore::new(&blocker, "/uploads");
        let err = store
            .save_upload(Bytes::from_static(b"GIF89a"), &mime::IMAGE_GIF)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UploadFailed(_)));
    }
}
