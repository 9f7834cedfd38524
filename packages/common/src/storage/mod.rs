mod error;
mod key;
mod policy;
mod traits;

pub mod memory;
pub mod s3;

pub use error::StorageError;
pub use key::{generate_key, original_filename, sanitize_filename};
pub use policy::{Bucket, PolicyError, UploadPolicy, file_kind};
pub use traits::{BoxReader, ObjectStore};
