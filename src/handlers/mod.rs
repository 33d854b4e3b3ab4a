//! S3 API request handlers, grouped by resource level.

pub mod bucket;
pub mod multipart;
pub mod object;
pub mod post_upload;
pub mod presign;
