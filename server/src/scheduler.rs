//! One periodic tick task per observed scenario.
//!
//! The task only ever touches scenario state through [`Registry::tick`], which
//! advances every track and builds the snapshot inside the registry's critical
//! section. Cancellation is checked between ticks, never during one, so a
//! cancelled task leaves tracks exactly as the last completed tick did.

use crate::error::Result;
use crate::hub::Group;
use crate::registry::Registry;
use log::{debug, error, info};
use sim_shared::{ScenarioId, ServerEvent, DEFAULT_TICK_MS, DEFAULT_TIME_STEP_S};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickConfig {
    /// Wall-clock time between ticks.
    pub interval: Duration,
    /// Simulated seconds each tick advances the tracks by.
    pub time_step: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_TICK_MS),
            time_step: DEFAULT_TIME_STEP_S,
        }
    }
}

impl TickConfig {
    /// Shortest period a tick loop will run at.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

    /// The configured interval, raised to [`Self::MIN_INTERVAL`].
    pub fn period(&self) -> Duration {
        self.interval.max(Self::MIN_INTERVAL)
    }
}

/// Handle to a running tick task.
#[derive(Debug)]
pub struct TickHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TickHandle {
    /// Asks the task to stop before its next tick.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the task has exited, whether cancelled or failed.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub fn spawn(registry: Arc<Registry>, scenario_id: ScenarioId) -> TickHandle {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_tick_loop(registry, scenario_id, cancel.clone()));
    TickHandle { cancel, task }
}

async fn run_tick_loop(registry: Arc<Registry>, scenario_id: ScenarioId, cancel: CancellationToken) {
    let config = registry.tick_config();
    let mut timer = interval(config.period());
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick since it fires immediately
    timer.tick().await;

    info!(
        "Started tick loop for scenario {} ({:?} period)",
        scenario_id,
        config.period()
    );

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Tick loop for scenario {} cancelled", scenario_id);
                break;
            }

            _ = timer.tick() => {
                match tick_once(&registry, scenario_id).await {
                    Ok(Some(reached)) => debug!("Scenario {} tick sent to {} observers", scenario_id, reached),
                    Ok(None) => {}
                    Err(e) => {
                        // state stays in the registry; the next observer restarts ticking
                        error!("Tick loop for scenario {} failed: {}", scenario_id, e);
                        break;
                    }
                }
            }
        }
    }
}

/// Runs one tick and broadcasts the resulting snapshot.
///
/// Returns `Ok(None)` when the scenario is not running and nothing was sent.
pub async fn tick_once(registry: &Registry, scenario_id: ScenarioId) -> Result<Option<usize>> {
    let Some(snapshot) = registry.tick(scenario_id).await? else {
        return Ok(None);
    };
    let reached = registry
        .hub()
        .publish(Group::Scenario(scenario_id), &ServerEvent::Snapshot(snapshot))
        .await?;
    Ok(Some(reached))
}
