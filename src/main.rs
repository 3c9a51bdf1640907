use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use tokio::runtime::Handle;
use tracing::{info, trace};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use imgcache::domain::{ImageRequest, LoadedImage, SlotId, SlotTarget};
use imgcache::infrastructure::{
    AppConfig, CliArgs, FetchCoordinator, FetchPool, HttpFetcher, ImageCache, RasterDecoder,
    StorageManager,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

/// Prints each image as it lands.
struct ReportTarget {
    url: String,
}

impl SlotTarget for ReportTarget {
    fn show_image(&self, image: &LoadedImage) {
        println!(
            "{} {}x{} from {} {}",
            image.key,
            image.image.width(),
            image.image.height(),
            image.source,
            self.url
        );
    }

    fn show_placeholder(&self) {
        trace!(url = %self.url, "Placeholder");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(&args);

    init_logging(&config)?;

    info!(version = imgcache::VERSION, "Starting {}", imgcache::NAME);

    let fetcher = Arc::new(HttpFetcher::new(config.cache.timeout())?);
    let cache = Arc::new(
        ImageCache::open(&config.cache, fetcher, Arc::new(RasterDecoder::default())).await,
    );
    let pool = FetchPool::new(Handle::current(), config.cache.max_concurrent_fetches);
    let coordinator = FetchCoordinator::new(Arc::clone(&cache), pool);

    // Targets are held weakly by the coordinator.
    let mut targets: Vec<Arc<dyn SlotTarget>> = Vec::with_capacity(args.urls.len());
    let mut handles = Vec::new();
    for (slot, url) in (0u64..).zip(&args.urls) {
        let target: Arc<dyn SlotTarget> = Arc::new(ReportTarget { url: url.clone() });
        let request = ImageRequest::new(url.clone(), args.width, args.height);
        if let Some(handle) = coordinator
            .dispatch(SlotId::new(slot), &target, Some(request))
            .into_handle()
        {
            handles.push(handle);
        }
        targets.push(target);
    }

    for handle in handles {
        handle.join().await;
    }

    if let Some(flush) = cache.flush() {
        flush.await?;
    }

    info!(stats = %cache.memory_stats(), "Done");
    println!("{}", cache.memory_stats());

    Ok(())
}
