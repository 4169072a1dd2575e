//! Image validation and hand-off to object storage.
//!
//! Two ingestion paths share one pipeline: a `data:` URI sent over the
//! real-time channel and a multipart file sent over HTTP. They carry
//! different size ceilings.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use domains::{AppError, MediaStore, Result};
use mime::Mime;
use tracing::{error, info, warn};

const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePolicy {
    /// Ceiling on decoded bytes for the real-time `data:` URI path.
    pub data_uri_max_bytes: usize,
    /// Ceiling for the HTTP multipart path.
    pub multipart_max_bytes: usize,
    pub allowed_mime_types: Vec<Mime>,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            data_uri_max_bytes: 15 * MIB,
            multipart_max_bytes: 10 * MIB,
            allowed_mime_types: vec![mime::IMAGE_JPEG, mime::IMAGE_PNG, mime::IMAGE_GIF, image_webp()],
        }
    }
}

/// `mime` has no constant for WebP.
pub fn image_webp() -> Mime {
    "image/webp".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

/// Parses a comma-delimited MIME list, skipping entries that do not parse.
pub fn parse_mime_list(raw: &str) -> Vec<Mime> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .filter_map(|m| m.parse().ok())
        .collect()
}

/// An inbound image, before validation.
#[derive(Debug, Clone)]
pub enum ImagePayload<'a> {
    /// `data:image/png;base64,....`
    DataUri(&'a str),
    Multipart {
        content_type: Option<&'a str>,
        bytes: Bytes,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub mime: Mime,
    pub bytes: Bytes,
}

pub struct ImageIngest {
    policy: ImagePolicy,
    store: Arc<dyn MediaStore>,
}

impl ImageIngest {
    pub fn new(policy: ImagePolicy, store: Arc<dyn MediaStore>) -> Self {
        Self { policy, store }
    }

    pub fn policy(&self) -> &ImagePolicy {
        &self.policy
    }

    /// Validates `payload` and uploads it, returning the public URL.
    ///
    /// Unauthenticated callers are refused before anything is decoded or
    /// uploaded. An upload failure is reported as `UploadFailed` and nothing
    /// references the image afterwards.
    #[tracing::instrument(level = "debug", skip(self, payload))]
    pub async fn ingest(&self, payload: ImagePayload<'_>, authenticated: bool) -> Result<String> {
        if !authenticated {
            warn!("image attached without authentication");
            return Err(AppError::AuthRequiredForImage);
        }
        let image = self.decode(payload)?;
        let size = image.bytes.len();
        let url = self
            .store
            .save_upload(image.bytes, &image.mime)
            .await
            .map_err(|err| {
                error!(%err, "image upload failed");
                match err {
                    AppError::UploadFailed(msg) => AppError::UploadFailed(msg),
                    other => AppError::UploadFailed(other.to_string()),
                }
            })?;
        info!(mime = %image.mime, size, %url, "image stored");
        Ok(url)
    }

    /// Checks encoding, MIME type and size, in that order.
    pub fn decode(&self, payload: ImagePayload<'_>) -> Result<DecodedImage> {
        match payload {
            ImagePayload::DataUri(uri) => self.decode_data_uri(uri),
            ImagePayload::Multipart {
                content_type,
                bytes,
            } => {
                let mime = content_type
                    .and_then(|ct| ct.parse::<Mime>().ok())
                    .ok_or(AppError::UnsupportedImageFormat)?;
                self.check(mime, bytes, self.policy.multipart_max_bytes)
            }
        }
    }

    fn decode_data_uri(&self, uri: &str) -> Result<DecodedImage> {
        let (header, data) = uri
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(','))
            .ok_or(AppError::UnsupportedImageFormat)?;
        let mime = header
            .strip_suffix(";base64")
            .and_then(|m| m.parse::<Mime>().ok())
            .ok_or(AppError::UnsupportedImageFormat)?;
        self.ensure_allowed(&mime)?;
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|_| AppError::UnsupportedImageFormat)?;
        self.check(mime, Bytes::from(bytes), self.policy.data_uri_max_bytes)
    }

    fn check(&self, mime: Mime, bytes: Bytes, limit: usize) -> Result<DecodedImage> {
        self.ensure_allowed(&mime)?;
        if bytes.len() > limit {
            return Err(AppError::ImageTooLarge { limit });
        }
        // The declared type has to agree with what the bytes actually are.
        let sniffed = image::guess_format(&bytes).map_err(|_| AppError::UnsupportedImageFormat)?;
        if sniffed.to_mime_type() != mime.essence_str() {
            return Err(AppError::UnsupportedImageFormat);
        }
        Ok(DecodedImage { mime, bytes })
    }

    fn ensure_allowed(&self, mime: &Mime) -> Result<()> {
        let allowed = self
            .policy
            .allowed_mime_types
            .iter()
            .any(|m| m.essence_str() == mime.essence_str());
        if allowed {
            Ok(())
        } else {
            Err(AppError::UnsupportedImageFormat)
        }
    }
}
