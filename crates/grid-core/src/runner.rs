//! Tick Loop
//!
//! Drives the engine at a fixed interval, one tick in flight at a time.
//! Late ticks are delayed rather than bursted, and a shutdown signal drops
//! the in-flight tick.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::TickEngine;
use crate::llm::LanguageModel;
use crate::registry::AgentRegistry;
use crate::report_log::ReportLog;
use crate::store::TranscriptBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub interval: Duration,
    /// 0 runs until shutdown
    pub max_ticks: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_ticks: 0,
        }
    }
}

/// Totals over a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub ticks: u64,
    pub conversations: u64,
    pub failed_conversations: u64,
    /// Whether the run ended on the shutdown signal
    pub interrupted: bool,
}

/// Runs ticks until `max_ticks` is reached or `shutdown` resolves.
pub async fn run<M, B, R, S>(
    engine: &TickEngine<M, B>,
    registry: &mut AgentRegistry,
    rng: &mut R,
    log: &mut ReportLog,
    options: RunOptions,
    shutdown: S,
) -> RunSummary
where
    M: LanguageModel,
    B: TranscriptBackend,
    R: Rng + ?Sized,
    S: Future<Output = ()>,
{
    let mut summary = RunSummary {
        run_id: engine.run_id(),
        ..RunSummary::default()
    };

    let mut ticker = interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(
        "Run {} started: {} agents, tick every {:?}",
        summary.run_id,
        registry.len(),
        options.interval
    );

    loop {
        if options.max_ticks > 0 && summary.ticks >= options.max_ticks {
            break;
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                summary.interrupted = true;
                break;
            }
            _ = ticker.tick() => {}
        }

        let tick = summary.ticks + 1;
        let report = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Tick {} cancelled by shutdown", tick);
                summary.interrupted = true;
                break;
            }
            report = engine.step(registry, rng, tick) => report,
        };

        summary.ticks = tick;
        summary.conversations += (report.proximity.len() - report.failures.len()) as u64;
        summary.failed_conversations += report.failures.len() as u64;

        if let Err(e) = log.log(&report) {
            warn!("Could not write report for tick {}: {}", tick, e);
        }
    }

    if let Err(e) = log.flush() {
        warn!("Could not flush report log: {}", e);
    }
    info!(
        "Run {} finished after {} ticks: {} conversations, {} failed",
        summary.run_id, summary.ticks, summary.conversations, summary.failed_conversations
    );
    summary
}
