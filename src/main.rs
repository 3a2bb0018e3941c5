use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pixload::domain::entities::ImageId;
use pixload::domain::ports::{DisplayTarget, ImageLoadingListener};
use pixload::infrastructure::{
    ChannelContext, CliArgs, ConfigStore, ImageLoader, ImageLoaderConfiguration, LoaderSettings,
    MainLoop, UrlSourceProvider,
};
use pixload::presentation::{FileTarget, LoggingListener};

fn init_logging(settings: &LoaderSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.to_string()));

    if let Some(log_path) = settings.effective_log_path() {
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

fn load_settings(args: &CliArgs) -> Result<LoaderSettings> {
    let mut settings = ConfigStore::new()?.load(args.config.as_deref())?;
    settings.merge_with_args(args);
    Ok(settings)
}

/// Drives the owning context until every request reported back or no task is left.
async fn drive(loader: &ImageLoader, main_loop: &mut MainLoop, listener: &LoggingListener) {
    while listener.remaining() > 0 {
        tokio::select! {
            alive = main_loop.turn() => {
                if !alive {
                    break;
                }
            }
            () = loader.wait_idle() => {
                main_loop.run_pending();
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let settings = load_settings(&args)?;
    init_logging(&settings)?;

    info!(version = pixload::VERSION, "Starting {}", pixload::NAME);

    let size = args.size;
    let configuration = ImageLoaderConfiguration::from_settings(settings).await?;
    let loader = ImageLoader::new();
    loader.init(configuration)?;

    if args.clear_cache {
        loader.clear_disc_cache().await?;
        info!("Disc cache cleared");
    }

    std::fs::create_dir_all(&args.out)?;

    let (context, mut main_loop) = ChannelContext::new();
    let provider = Arc::new(UrlSourceProvider);
    let ids: Vec<ImageId> = args
        .ids
        .iter()
        .map(ImageId::new)
        .filter(|id| {
            if id.is_empty() {
                warn!("Skipping empty image id");
            }
            !id.is_empty()
        })
        .collect();
    let listener = Arc::new(LoggingListener::new(ids.len()));

    // Targets must outlive their tasks or the results are dropped as stale.
    let mut targets: Vec<Arc<dyn DisplayTarget>> = Vec::with_capacity(ids.len());
    for id in ids {
        let target: Arc<dyn DisplayTarget> =
            FileTarget::for_id(&args.out, &id, context.clone(), size);
        targets.push(target.clone());

        if let Err(e) = loader.display_image(
            id.clone(),
            provider.clone(),
            target,
            None,
            Some(listener.clone()),
        ) {
            listener.on_loading_failed(&id, &e);
        }
    }

    drive(&loader, &mut main_loop, &listener).await;
    loader.stop();

    if let Some(stats) = loader.memory_cache_stats() {
        info!(
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = stats.hit_rate,
            cached = stats.size,
            "Memory cache"
        );
    }

    let total = targets.len();
    let failed = listener.failed();
    if failed > 0 {
        return Err(eyre!("{failed} of {total} images failed to load"));
    }
    info!(total, out = %args.out.display(), "All images loaded");

    Ok(())
}
