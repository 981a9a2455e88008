use anyhow::Context;
use clap::Parser;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto;
use image_proxy::client::ObjectStoreClient;
use image_proxy::config::AppConfig;
use image_proxy::domain::cache_policy::HeaderPolicy;
use image_proxy::observability::tracing_setup;
use image_proxy::repository::bucket_repository::BucketRepository;
use image_proxy::repository::cache_repository::CacheRepository;
use image_proxy::repository::volume_repository::VolumeRepository;
use image_proxy::response_handler::CorsPolicy;
use image_proxy::router::{router, AppState};
use image_proxy::service::ImageService;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

type ProxyState = AppState<BucketRepository, VolumeRepository>;

#[derive(Clone)]
pub struct TokioExecutor;

impl<F> hyper::rt::Executor<F> for TokioExecutor
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        tokio::task::spawn(fut);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::parse();
    let provider = tracing_setup(config.log_format, config.trace_stdout)?;
    // Only the first install wins; reqwest already carries its own provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let state = Arc::new(build_state(&config)?);
    if state.service.cache().is_some() {
        info!(
            "Memory cache enabled: ttl {}s, {} entries, {} bytes",
            config.cache_ttl_secs, config.cache_max_entries, config.cache_max_bytes
        );
        let state = state.clone();
        tokio::task::spawn(async move {
            if let Some(cache) = state.service.cache() {
                cache.cull_images_loop().await;
            }
        });
    }

    let addr = config.addr()?;
    info!("Attempting to start server at {addr}");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Server started at {addr}");

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };

        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| router(req, state.clone()));
            if let Err(err) = auto::Builder::new(TokioExecutor)
                .serve_connection(io, service)
                .await
            {
                error!("Error serving connection from {peer}: {err:?}");
            }
        });
    }

    if let Err(err) = provider.shutdown() {
        warn!("Tracer provider did not shut down cleanly: {err}");
    }
    Ok(())
}

fn build_state(config: &AppConfig) -> anyhow::Result<ProxyState> {
    let remote = match config.object_store() {
        Some(store) => {
            let client = ObjectStoreClient::new(store).context("building R2 client")?;
            Some(BucketRepository::new(Arc::new(client)))
        }
        None if config.use_r2 => {
            warn!("R2 is enabled but not configured; serving local images only");
            None
        }
        None => None,
    };

    let local = if config.fallback_to_local {
        info!("Local fallback from {}", config.static_dir.display());
        Some(VolumeRepository::new(config.static_dir.clone()))
    } else {
        None
    };

    let cache = config
        .cache_enabled
        .then(|| {
            CacheRepository::new(
                config.cache_ttl(),
                config.cache_max_entries,
                config.cache_max_bytes,
            )
        });

    Ok(AppState {
        service: ImageService::new(remote, local, cache),
        headers: HeaderPolicy::new(config.app_env),
        cors: CorsPolicy::new(config.allowed_origins.clone()),
        route_prefix: config.route_prefix.clone(),
    })
}
