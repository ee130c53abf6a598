use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use campusmarket_core::RequestId;

/// Image extensions accepted for listing uploads.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// Per-image size cap.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("unsupported image type '{0}' (allowed: jpg, jpeg, png, gif)")]
    UnsupportedType(String),

    #[error("image exceeds the {} MiB limit", MAX_IMAGE_BYTES / (1024 * 1024))]
    TooLarge,

    #[error("empty upload")]
    Empty,

    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
}

/// An uploaded image, as received from the transport layer.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Lower-cased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

/// Validate an upload against the type allow-list and the size cap.
///
/// Runs before any file is written, so a bad image in a batch aborts the
/// whole submission with nothing on disk.
pub fn validate_upload(upload: &ImageUpload) -> Result<(), MediaError> {
    if upload.bytes.is_empty() {
        return Err(MediaError::Empty);
    }
    if upload.bytes.len() > MAX_IMAGE_BYTES {
        return Err(MediaError::TooLarge);
    }
    match upload.extension() {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(MediaError::UnsupportedType(ext)),
        None => Err(MediaError::UnsupportedType(String::new())),
    }
}

/// Accepts an image blob, returns a public URL; deletes by URL.
pub trait FileStore: Send + Sync {
    /// Persist a validated upload staged under `request`; returns the URL
    /// the image will be served from.
    fn save(&self, upload: &ImageUpload, request: RequestId) -> Result<String, MediaError>;

    /// Best-effort delete by URL. Returns whether a file was removed.
    fn delete(&self, url: &str) -> bool;
}

impl<S> FileStore for Arc<S>
where
    S: FileStore + ?Sized,
{
    fn save(&self, upload: &ImageUpload, request: RequestId) -> Result<String, MediaError> {
        (**self).save(upload, request)
    }

    fn delete(&self, url: &str) -> bool {
        (**self).delete(url)
    }
}

/// Local-disk file store.
///
/// Files land in `root` under a unique name and are addressed as
/// `<public_prefix>/<file name>`.
pub struct LocalFileStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into(),
        }
    }

    fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}

impl FileStore for LocalFileStore {
    fn save(&self, upload: &ImageUpload, request: RequestId) -> Result<String, MediaError> {
        validate_upload(upload)?;

        // Extension presence is guaranteed by validation above.
        let ext = upload.extension().unwrap_or_default();
        let file_name = format!("request-{request}-{}.{ext}", Uuid::now_v7().simple());

        fs::create_dir_all(&self.root)?;
        fs::write(self.path_for(&file_name), &upload.bytes)?;

        Ok(format!("{}/{}", self.public_prefix, file_name))
    }

    fn delete(&self, url: &str) -> bool {
        let Some(file_name) = url.rsplit('/').next() else {
            return false;
        };
        let path = self.path_for(file_name);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("failed to delete media file {}: {e}", path.display());
                false
            }
        }
    }
}
