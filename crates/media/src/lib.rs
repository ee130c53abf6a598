//! `campusmarket-media` — image upload validation and file storage.
//!
//! The store is a collaborator of the request lifecycle: it accepts image
//! bytes and returns a public URL, and can delete by URL. Validation
//! (extension allow-list, size cap) happens before anything touches disk.

pub mod store;

pub use store::{
    validate_upload, FileStore, ImageUpload, LocalFileStore, MediaError, ALLOWED_EXTENSIONS,
    MAX_IMAGE_BYTES,
};
