/// Main entry point for bubblescreener
///
/// Headless service: loads configuration, wires the DexScreener client into
/// the cache tiers, starts the background refresh scheduler and runs until
/// Ctrl+C.
use anyhow::Result;
use bubblescreener::{
    apis::dexscreener::DexScreenerClient,
    arguments::{self, is_help_requested, print_help},
    config::Config,
    logger::{self, LogTag},
    scheduler::RefreshScheduler,
    service::BubbleService,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    arguments::set_cmd_args(std::env::args().collect());

    if is_help_requested() {
        print_help();
        return Ok(());
    }

    logger::init();
    logger::info(LogTag::System, "🚀 bubblescreener starting up...");

    let config_path = arguments::config_path();
    let config = Config::load_or_create(&config_path)?;
    logger::info(
        LogTag::System,
        &format!(
            "Config loaded from {} ({} feeds, scheduler every {}s)",
            config_path,
            config.sources.feeds.len(),
            config.scheduler.interval_secs
        ),
    );

    let api = Arc::new(DexScreenerClient::new(&config.api)?);
    let service = BubbleService::new(api, &config);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })?;
    }

    let scheduler = RefreshScheduler::new(
        service.snapshot_cache(),
        service.recent_cache(),
        &config.scheduler,
        shutdown.clone(),
    );
    let scheduler_handle = scheduler.spawn();

    // Warm the snapshot tier before settling into the run loop
    let limit = arguments::limit_override();
    match service.top_snapshot(limit).await {
        Ok(view) => logger::info(
            LogTag::System,
            &format!("Initial snapshot ready: {} records", view.records.len()),
        ),
        Err(e) => logger::warning(
            LogTag::System,
            &format!("Initial snapshot unavailable, scheduler will retry: {}", e),
        ),
    }

    let mut ticks: u64 = 0;
    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_secs(1)).await;
        ticks += 1;
        if ticks % 60 == 0 {
            let health = service.health();
            logger::info(
                LogTag::System,
                &format!(
                    "Health: {} | snapshot {} records (age {}ms) | {} recent | {} refreshes / {} failures",
                    if health.healthy { "ok" } else { "degraded" },
                    health.snapshot_records,
                    health.snapshot_age_ms.unwrap_or(0),
                    health.recent_entries,
                    health.snapshot_refreshes,
                    health.snapshot_failures
                ),
            );
        }
    }

    logger::info(LogTag::System, "Shutting down...");
    if let Some(handle) = scheduler_handle {
        let _ = handle.await;
    }
    logger::info(LogTag::System, "✅ bubblescreener stopped");
    Ok(())
}
