use crate::domain::error::RepositoryError;
use crate::domain::image_path::ImagePath;
use crate::domain::ImageSource;
use chrono::{DateTime, Utc};
use hyper::body::Bytes;
use std::future::Future;

pub mod bucket_repository;
pub mod cache_repository;
pub mod volume_repository;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Image bytes as returned by one tier.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub bytes: Bytes,
    pub content_type: String,
    pub source: ImageSource,
    pub metadata: ImageMetadata,
}

pub trait ImageRepository: Send + Sync {
    fn read_image(
        &self,
        path: &ImagePath,
    ) -> impl Future<Output = Result<StoredImage, RepositoryError>> + Send;

    /// Cheap reachability probe for health reporting.
    fn is_reachable(&self) -> impl Future<Output = bool> + Send;
}
