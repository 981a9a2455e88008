use crate::client::{ObjectStoreClient, ObjectStoreError};
use crate::domain::error::RepositoryError;
use crate::domain::image_path::ImagePath;
use crate::domain::{pick_content_type, ImageSource};
use crate::repository::{ImageMetadata, ImageRepository, StoredImage};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct BucketRepository {
    client: Arc<ObjectStoreClient>,
}

impl BucketRepository {
    pub fn new(client: Arc<ObjectStoreClient>) -> BucketRepository {
        BucketRepository { client }
    }
}

impl ImageRepository for BucketRepository {
    /// Request the image from the bucket and bundle into a `StoredImage`.
    #[instrument(skip_all, fields(path = %path))]
    async fn read_image(&self, path: &ImagePath) -> Result<StoredImage, RepositoryError> {
        let object = self.client.get_object(path.as_str()).await.map_err(|err| {
            match err {
                ObjectStoreError::NotFound => debug!("R2 has no object at {path}"),
                ref other => warn!(kind = other.kind(), "R2 read failed for {path}: {other}"),
            }
            RepositoryError::Remote(err)
        })?;

        Ok(StoredImage {
            content_type: pick_content_type(object.content_type.as_deref(), path.as_str()),
            bytes: object.bytes,
            source: ImageSource::Remote,
            metadata: ImageMetadata {
                etag: object.etag,
                last_modified: object.last_modified,
            },
        })
    }

    async fn is_reachable(&self) -> bool {
        if !self.client.is_configured() {
            return false;
        }
        match self.client.list_objects("", 1).await {
            Ok(_) => true,
            // anonymous-only setups cannot list, so probe the public URL instead
            Err(ObjectStoreError::NotConfigured) => self.probe_public_url().await,
            Err(err) => {
                warn!(kind = err.kind(), "R2 health probe failed: {err}");
                false
            }
        }
    }
}

impl BucketRepository {
    async fn probe_public_url(&self) -> bool {
        match self.client.get_object("").await {
            // any answer from the bucket host counts, public buckets refuse root reads
            Ok(_) | Err(ObjectStoreError::NotFound) | Err(ObjectStoreError::Unauthorized { .. }) => {
                true
            }
            Err(err) => {
                warn!(kind = err.kind(), "R2 public URL probe failed: {err}");
                false
            }
        }
    }
}
