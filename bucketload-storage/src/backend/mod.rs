mod common;
mod in_memory;
mod s3_compatible;

pub use common::{Container, Storage, StorageError, StorageResult};
pub use in_memory::InMemoryStorage;
pub use s3_compatible::S3CompatibleStorage;
