//! S3 API request handlers

pub mod bucket;
pub mod multipart;
pub mod object;

// Re-exports
pub use bucket::*;
pub use multipart::*;
pub use object::*;
