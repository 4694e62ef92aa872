mod args;

use std::error::Error;
use std::sync::Arc;

use dash_pipeline::adaptation::AdaptationLogic;
use dash_pipeline::{
    fetch_presentation, Advance, CacheDirectory, ConstantAdaptation, DashEvent, DashPlayer,
    HttpTransport, Mp4Remuxer, PlayerConfig, RateBasedAdaptation, SegmentCallback, SegmentFetcher,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, Layer};
use url::Url;

use crate::args::{get_log_level_filter, parse_args, Strategy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = parse_args();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_filter(get_log_level_filter(&args));
    let subscriber = tracing_subscriber::registry().with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{:?}", args);

    let mut config = match &args.config {
        Some(path) => serde_json::from_slice::<PlayerConfig>(&std::fs::read(path)?)?,
        None => PlayerConfig::default(),
    };
    if let Some(bytes) = args.cache_bytes {
        config = config.with_used_cache_capacity(bytes);
    }

    let transport = Arc::new(HttpTransport::with_headers(&config.request_headers)?);
    let mpd_url = Url::parse(&args.mpd_url)?;
    let presentation = Arc::new(fetch_presentation(transport.as_ref(), &mpd_url).await?);

    let set = presentation
        .first_period()
        .and_then(|period| period.video_set().or_else(|| period.adaptation_sets.first()))
        .cloned()
        .ok_or("presentation has no adaptation set")?;

    let logic: Arc<dyn AdaptationLogic> = match args.strategy {
        Strategy::Lowest => Arc::new(ConstantAdaptation::lowest()),
        Strategy::Highest => Arc::new(ConstantAdaptation::highest()),
        Strategy::RateBased => Arc::new(RateBasedAdaptation::new()),
    };

    let directory = Arc::new(match &args.cache_dir {
        Some(path) => CacheDirectory::create(path)?,
        None => CacheDirectory::temporary()?,
    });
    info!(path = %directory.path().display(), "Caching segments");
    let fetcher = SegmentFetcher::new(transport, Arc::new(Mp4Remuxer), directory);

    let callback: SegmentCallback = Arc::new(|event: DashEvent| match event {
        DashEvent::SegmentReady {
            number,
            representation_id,
            path,
            pts_offset_us,
        } => {
            info!(number, %representation_id, pts_offset_us, path = %path.display(), "Segment ready");
        }
        DashEvent::RepresentationChanged { from, to } => {
            info!(%from, %to, "Representation changed");
        }
        DashEvent::EndOfStream => info!("End of stream"),
        DashEvent::DownloadError { url, reason } => {
            warn!("Error downloading {}: {}", url, reason);
        }
    });

    let mut player = DashPlayer::open(presentation, set, logic, fetcher, &config, Some(callback)).await?;

    if let Some(seconds) = args.start_at {
        let outcome = player.seek((seconds.max(0.0) * 1_000_000.0) as u64).await?;
        info!(index = outcome.index, pts_offset_us = outcome.pts_offset_us, "Started at offset");
    }

    loop {
        match player.advance_to_next_segment().await {
            Ok(Advance::Segment(_)) => {
                info!(
                    buffered_us = player.cached_duration_us(),
                    buffered_to_end = player.has_reached_cache_end_of_stream(),
                    "Advanced"
                );
            }
            Ok(Advance::EndOfStream) => break,
            Err(err) => {
                error!("Playback failed: {}", err);
                player.release();
                return Err(err.into());
            }
        }
    }

    player.release();
    Ok(())
}
