use anyhow::Context;
use clap::Parser;
use hbt::hbt_config::{Args, TrackerConfig};
use hbt::hbt_controllers::HBTControllers;
use hbt::hbt_engine::DisplaySink;
use hbt::hbt_feed::HttpFeedClient;
use hbt::hbt_normalizer::SnapshotNormalizer;
use hbt::hbt_scheduler::PollScheduler;
use hbt::hbt_views::{ConsoleSink, GeoJsonSink, HBTViews};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Set up panic hook for better error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n{}", "═".repeat(70));
        eprintln!("❌ TRACKER PANIC");
        eprintln!("{}", "═".repeat(70));
        eprintln!("{}", panic_info);
        eprintln!("\n💡 Restart the tracker, and report this issue if it persists");
        eprintln!("{}", "═".repeat(70));
    }));

    let config = TrackerConfig::from_args(Args::parse()).context("Invalid configuration")?;
    let destinations = config
        .load_destinations()
        .context("Failed to load destination table")?;

    let client = HttpFeedClient::new(&config.feed_url, config.feed_format, config.request_timeout)
        .context("Failed to set up feed client")?;
    log::info!("Feed: {} ({})", client.url(), config.feed_format);

    let sink: Box<dyn DisplaySink> = match &config.geojson_out {
        Some(path) => {
            log::info!("Writing vehicle positions to {:?}", path);
            Box::new(GeoJsonSink::with_output(path.clone()))
        }
        None => Box::new(ConsoleSink::new()),
    };

    let scheduler = PollScheduler::new(
        client,
        SnapshotNormalizer::new(destinations.clone()),
        sink,
        config.initial_filter(),
    );

    HBTViews::show_welcome(config.poll_interval.as_secs(), &config.initial_filter());
    scheduler
        .start(config.poll_interval)
        .context("Failed to start polling")?;

    let input = HBTControllers::spawn_stdin_reader();
    let default_filter = config.default_filter();
    tokio::select! {
        _ = HBTControllers::run(&scheduler, &destinations, &default_filter, input) => {}
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted"),
    }

    scheduler.stop().await;
    HBTViews::goodbye_message();
    Ok(())
}
