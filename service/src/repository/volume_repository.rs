use crate::domain::error::RepositoryError;
use crate::domain::image_path::ImagePath;
use crate::domain::{content_type_for, ImageSource};
use crate::repository::{ImageMetadata, ImageRepository, StoredImage};
use chrono::{DateTime, Utc};
use futures_util::TryFutureExt;
use hyper::body::Bytes;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Instant, UNIX_EPOCH};
use tracing::{debug, error, info, instrument};

/// Local static-asset directory used when R2 cannot serve an image.
#[derive(Debug, Clone)]
pub struct VolumeRepository {
    root: PathBuf,
}

impl VolumeRepository {
    pub fn new(root: impl Into<PathBuf>) -> VolumeRepository {
        VolumeRepository { root: root.into() }
    }
}

impl ImageRepository for VolumeRepository {
    #[instrument(skip_all, fields(path = %path))]
    async fn read_image(&self, path: &ImagePath) -> Result<StoredImage, RepositoryError> {
        let timer = Instant::now();
        let full_path = self.root.join(path.as_str());

        let to_error = |err: std::io::Error| {
            if err.kind() == ErrorKind::NotFound {
                info!("FS has no image at {}", full_path.display());
                RepositoryError::NotFound {
                    path: path.to_string(),
                }
            } else {
                error!("FS could not read image at {}: {err}", full_path.display());
                RepositoryError::Io {
                    path: path.to_string(),
                    source: err,
                }
            }
        };

        let metadata = tokio::fs::metadata(&full_path).map_err(to_error).await?;
        if !metadata.is_file() {
            return Err(RepositoryError::NotFound {
                path: path.to_string(),
            });
        }
        let bytes: Vec<u8> = tokio::fs::read(&full_path).map_err(to_error).await?;

        let modified = metadata.modified().ok();
        let last_modified = modified.map(DateTime::<Utc>::from);
        let etag = modified
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .map(|since| format!("W/\"{:x}-{:x}\"", bytes.len(), since.as_secs()));

        debug!(
            "FS read took {} ms for {}",
            timer.elapsed().as_millis(),
            path
        );
        Ok(StoredImage {
            content_type: content_type_for(path.file_name()).to_string(),
            bytes: Bytes::from(bytes),
            source: ImageSource::Local,
            metadata: ImageMetadata {
                etag,
                last_modified,
            },
        })
    }

    async fn is_reachable(&self) -> bool {
        match tokio::fs::metadata(&self.root).await {
            Ok(metadata) => metadata.is_dir(),
            Err(err) => {
                error!("Static image root {} unavailable: {err}", self.root.display());
                false
            }
        }
    }
}
