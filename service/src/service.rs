use crate::domain::error::{ErrorResponse, RepositoryError};
use crate::domain::health::HealthStatus;
use crate::domain::image_path::ImagePath;
use crate::domain::server_timing::ServerTiming;
use crate::repository::cache_repository::CacheRepository;
use crate::repository::{ImageRepository, StoredImage};
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// A successfully resolved image together with how it was found.
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub image: StoredImage,
    pub cache_hit: bool,
    pub server_timing: ServerTiming,
}

pub type InternalResponse = Result<ResolvedImage, ErrorResponse>;

/// Resolves images through the tiers in order: memory cache (optional), R2, local volume.
///
/// A tier that is `None` is skipped: R2 when remote reads are disabled or
/// unconfigured, the volume when fallback to local files is disabled.
pub struct ImageService<R, L> {
    remote: Option<R>,
    local: Option<L>,
    cache: Option<CacheRepository>,
}

impl<R, L> ImageService<R, L>
where
    R: ImageRepository,
    L: ImageRepository,
{
    pub fn new(remote: Option<R>, local: Option<L>, cache: Option<CacheRepository>) -> Self {
        ImageService {
            remote,
            local,
            cache,
        }
    }

    pub fn cache(&self) -> Option<&CacheRepository> {
        self.cache.as_ref()
    }

    /// Tiers are tried one after another, each at most once. Any R2 failure
    /// falls through to the local volume; only the final outcome is returned.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn resolve(&self, path: &ImagePath) -> InternalResponse {
        let process_timer = Instant::now();
        let mut server_timing = ServerTiming::default();

        if let Some(cache) = &self.cache {
            let timer = Instant::now();
            let cached = cache.read_image(path).await;
            server_timing.record("cache", timer.elapsed(), None);
            if let Ok(image) = cached {
                return Ok(ResolvedImage {
                    image,
                    cache_hit: true,
                    server_timing,
                });
            }
        }

        let mut found = None;

        if let Some(remote) = &self.remote {
            let timer = Instant::now();
            let result = remote.read_image(path).await;
            match result {
                Ok(image) => {
                    server_timing.record("r2", timer.elapsed(), None);
                    found = Some(image);
                }
                Err(RepositoryError::Remote(err)) => {
                    server_timing.record("r2", timer.elapsed(), Some(err.kind().to_string()));
                    debug!("Falling back from R2 for {path}: {err}");
                }
                Err(err) => {
                    server_timing.record("r2", timer.elapsed(), Some("error".to_string()));
                    debug!("Falling back from R2 for {path}: {err}");
                }
            }
        }

        if found.is_none() {
            if let Some(local) = &self.local {
                let timer = Instant::now();
                let result = local.read_image(path).await;
                server_timing.record("local", timer.elapsed(), None);
                match result {
                    Ok(image) => found = Some(image),
                    Err(RepositoryError::NotFound { .. }) => {}
                    Err(err) => return Err(ErrorResponse::unexpected(path.as_str(), err)),
                }
            }
        }

        let Some(image) = found else {
            warn!("No tier could serve {path}");
            return Err(ErrorResponse::ImageNotFoundError {
                path: path.to_string(),
            });
        };

        if let Some(cache) = &self.cache {
            cache.write_image(path, image.clone()).await;
        }

        debug!(
            "Resolved {path} from {} in {} ms",
            image.source,
            process_timer.elapsed().as_millis()
        );
        Ok(ResolvedImage {
            image,
            cache_hit: false,
            server_timing,
        })
    }

    /// Probes each tier. The probes are independent, so they run concurrently.
    #[instrument(skip(self))]
    pub async fn health(&self) -> HealthStatus {
        let remote = async {
            match &self.remote {
                Some(remote) => remote.is_reachable().await,
                None => false,
            }
        };
        let local = async {
            match &self.local {
                Some(local) => local.is_reachable().await,
                None => false,
            }
        };
        let cache = async {
            match &self.cache {
                Some(cache) => cache.is_reachable().await,
                None => false,
            }
        };

        let (r2, (local, cache)) =
            futures_util::future::join(remote, futures_util::future::join(local, cache)).await;
        HealthStatus::from_tiers(r2, cache, local)
    }
}
