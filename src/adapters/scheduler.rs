//! Periodic sweep driver.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::domain::bar::Timeframe;
use crate::domain::pipeline::RangeService;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepSchedule {
    pub interval: Duration,
    pub timeframe: Timeframe,
    pub bars: usize,
}

/// Spawn a task that sweeps every registered instrument on `schedule`.
///
/// The first sweep runs immediately. Each sweep is awaited before the next
/// tick, and ticks missed while a sweep was running are skipped.
pub fn spawn_sweeps(service: Arc<RangeService>, schedule: SweepSchedule) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(schedule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = schedule.interval.as_secs(),
            timeframe = %schedule.timeframe,
            bars = schedule.bars,
            "scheduler started"
        );

        loop {
            ticker.tick().await;
            let service = service.clone();
            let result = tokio::task::spawn_blocking(move || {
                service.fetch_all_symbols_data(schedule.timeframe, schedule.bars)
            })
            .await;
            match result {
                Ok(counts) => {
                    let with_data = counts.values().filter(|&&n| n > 0).count();
                    info!(symbols = counts.len(), with_data, "scheduled sweep complete");
                }
                Err(e) => error!(error = %e, "scheduled sweep panicked"),
            }
        }
    })
}
