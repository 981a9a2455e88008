use crate::domain::error::RepositoryError;
use crate::domain::image_path::ImagePath;
use crate::repository::{ImageRepository, StoredImage};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct CacheItem {
    time: Instant,
    image: StoredImage,
}

/// Bounded by entry count and by the summed size of the cached bytes.
pub struct Cache {
    map: HashMap<String, CacheItem>,
    ttl: Duration,
    max_entries: usize,
    max_bytes: usize,
    bytes: usize,
}

impl Cache {
    pub fn new(ttl: Duration, max_entries: usize, max_bytes: usize) -> Cache {
        Cache {
            map: HashMap::new(),
            ttl,
            max_entries,
            max_bytes,
            bytes: 0,
        }
    }

    fn read_image(&self, path: &str) -> Option<StoredImage> {
        let cache_item = self
            .map
            .get(path)
            .filter(|item| item.time.elapsed() < self.ttl);
        match cache_item {
            Some(_) => debug!("Cache hit: {}", path),
            None => debug!("Cache miss: {}", path),
        }
        cache_item.map(|item| item.image.clone())
    }

    /// Inserts, evicting the oldest entries until both limits hold. Images
    /// larger than the byte limit are never stored.
    pub fn write_image(&mut self, path: &str, image: StoredImage) {
        let size = image.bytes.len();
        if self.max_entries == 0 || size > self.max_bytes {
            debug!("Cache skip: {} ({} bytes)", path, size);
            return;
        }
        self.remove(path);
        while self.map.len() >= self.max_entries || self.bytes + size > self.max_bytes {
            let oldest = self
                .map
                .iter()
                .min_by_key(|(_, item)| item.time)
                .map(|(key, _)| key.clone());
            let Some(key) = oldest else {
                break;
            };
            self.remove(&key);
            debug!("Cache evict: {}", key);
        }
        self.bytes += size;
        self.map.insert(
            path.to_string(),
            CacheItem {
                time: Instant::now(),
                image,
            },
        );
        debug!("Cache write: {}", path);
    }

    fn remove(&mut self, path: &str) {
        if let Some(item) = self.map.remove(path) {
            self.bytes -= item.image.bytes.len();
        }
    }

    pub fn cull(&mut self) -> usize {
        let cull_timer = Instant::now();
        let start_length = self.map.len();
        let ttl = self.ttl;
        self.map.retain(|_, cache_item| cache_item.time.elapsed() < ttl);
        self.map.shrink_to_fit();
        self.bytes = self.map.values().map(|item| item.image.bytes.len()).sum();
        let diff = start_length - self.map.len();
        if diff > 0 {
            info!(
                "Cache culled ({} ms) {} items.",
                cull_timer.elapsed().as_millis(),
                diff
            )
        };
        diff
    }
}

/// Optional in-memory tier in front of R2 and the local volume.
pub struct CacheRepository {
    cache: RwLock<Cache>,
    ttl: Duration,
}

impl CacheRepository {
    pub fn new(ttl: Duration, max_entries: usize, max_bytes: usize) -> CacheRepository {
        CacheRepository {
            cache: RwLock::new(Cache::new(ttl, max_entries, max_bytes)),
            ttl,
        }
    }

    pub async fn write_image(&self, path: &ImagePath, image: StoredImage) {
        self.cache.write().await.write_image(path.as_str(), image);
    }

    pub async fn cull(&self) -> usize {
        self.cache.write().await.cull()
    }

    pub async fn cull_images_loop(&self) {
        let period = self.ttl.max(Duration::from_secs(1));
        let mut interval = time::interval(period);
        loop {
            interval.tick().await;
            self.cull().await;
        }
    }
}

impl ImageRepository for CacheRepository {
    async fn read_image(&self, path: &ImagePath) -> Result<StoredImage, RepositoryError> {
        self.cache
            .read()
            .await
            .read_image(path.as_str())
            .ok_or_else(|| RepositoryError::NotFound {
                path: path.to_string(),
            })
    }

    async fn is_reachable(&self) -> bool {
        true
    }
}
