//! Process-wide table of scenario runtimes.
//!
//! All run state, tracks, observer counts and tick handles live behind a single
//! mutex. Ticks and control commands both go through it, so for one scenario
//! they are totally ordered. Directory reads (first activation and reset) are
//! done with the mutex released and the result installed afterwards.
//!
//! Entries are created on first observation and never removed; a scenario
//! nobody watches keeps its state and only loses its tick task.

use crate::auth::Principal;
use crate::directory::ScenarioDirectory;
use crate::error::{Result, SimError};
use crate::hub::Hub;
use crate::scheduler::{self, TickConfig, TickHandle};
use crate::track::Track;
use chrono::{DateTime, Utc};
use log::info;
use sim_shared::{Action, ScenarioId, ScenarioSummary, ServerEvent, SimState, Snapshot};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Name and tracks of a scenario as read from the directory.
#[derive(Debug, Clone)]
pub struct LoadedScenario {
    pub name: String,
    pub tracks: BTreeMap<String, Track>,
}

/// Reads a scenario's aircraft from the directory and builds fresh tracks.
pub async fn load_scenario(
    directory: &dyn ScenarioDirectory,
    scenario_id: ScenarioId,
) -> Result<LoadedScenario> {
    let routes = directory.load_routes(scenario_id).await?;

    let mut tracks = BTreeMap::new();
    for record in &routes.aircraft {
        let track = Track::from_record(record)?;
        tracks.insert(track.external_id.clone(), track);
    }

    let name = routes
        .name
        .unwrap_or_else(|| format!("Scenario {}", scenario_id));
    info!(
        "Loaded {} tracks for scenario {} ({})",
        tracks.len(),
        scenario_id,
        name
    );
    Ok(LoadedScenario { name, tracks })
}

#[derive(Debug)]
pub struct ScenarioRuntime {
    pub id: ScenarioId,
    pub name: String,
    pub state: SimState,
    pub started_at: Option<DateTime<Utc>>,
    pub started_by: Option<String>,
    tracks: BTreeMap<String, Track>,
    observers: usize,
    ticker: Option<TickHandle>,
}

impl ScenarioRuntime {
    fn new(id: ScenarioId, loaded: LoadedScenario) -> Self {
        Self {
            id,
            name: loaded.name,
            state: SimState::Idle,
            started_at: None,
            started_by: None,
            tracks: loaded.tracks,
            observers: 0,
            ticker: None,
        }
    }

    fn install(&mut self, loaded: LoadedScenario) {
        self.name = loaded.name;
        self.tracks = loaded.tracks;
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, timestamp: DateTime<Utc>) -> Snapshot {
        let aircraft: Vec<_> = self.tracks.values().map(Track::snapshot).collect();
        Snapshot {
            scenario_id: self.id,
            scenario_name: self.name.clone(),
            state: self.state,
            timestamp,
            aircraft_count: aircraft.len(),
            aircraft,
        }
    }

    pub fn summary(&self) -> ScenarioSummary {
        ScenarioSummary {
            scenario_id: self.id,
            scenario_name: self.name.clone(),
            state: self.state,
            started_by: self.started_by.clone(),
            started_at: self.started_at,
        }
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn observers(&self) -> usize {
        self.observers
    }
}

/// What a new observer needs to know about the scenario it joined.
#[derive(Debug, Clone)]
pub struct Activation {
    pub scenario_name: String,
    pub state: SimState,
    pub snapshot: Snapshot,
    pub observers: usize,
}

/// Events produced by one control command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub previous: SimState,
    pub state: SimState,
    /// `control_ack` for the scenario group.
    pub ack: ServerEvent,
    /// `simulation_state` for the monitor group.
    pub notice: ServerEvent,
}

pub struct Registry {
    directory: Arc<dyn ScenarioDirectory>,
    hub: Arc<Hub>,
    tick: TickConfig,
    scenarios: Mutex<HashMap<ScenarioId, ScenarioRuntime>>,
}

impl Registry {
    pub fn new(directory: Arc<dyn ScenarioDirectory>, hub: Arc<Hub>, tick: TickConfig) -> Self {
        Self {
            directory,
            hub,
            tick,
            scenarios: Mutex::new(HashMap::new()),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn directory(&self) -> &dyn ScenarioDirectory {
        self.directory.as_ref()
    }

    pub fn tick_config(&self) -> TickConfig {
        self.tick
    }

    /// Registers a new observer of `scenario_id`.
    ///
    /// Creates the runtime on first use and makes sure a tick task is alive.
    pub async fn acquire(self: &Arc<Self>, scenario_id: ScenarioId) -> Result<Activation> {
        let mut scenarios = self.scenarios.lock().await;

        if !scenarios.contains_key(&scenario_id) {
            drop(scenarios);
            let loaded = load_scenario(self.directory(), scenario_id).await?;
            scenarios = self.scenarios.lock().await;
            // another observer may have installed it while we were loading
            if let Entry::Vacant(slot) = scenarios.entry(scenario_id) {
                info!("Created runtime for scenario {} ({})", scenario_id, loaded.name);
                slot.insert(ScenarioRuntime::new(scenario_id, loaded));
            }
        }

        let runtime = scenarios
            .get_mut(&scenario_id)
            .ok_or(SimError::NotInitialized(scenario_id))?;

        runtime.observers += 1;
        info!(
            "Scenario {} observers = {}",
            scenario_id, runtime.observers
        );

        if runtime.ticker.as_ref().map_or(true, TickHandle::is_finished) {
            runtime.ticker = Some(scheduler::spawn(Arc::clone(self), scenario_id));
        }

        Ok(Activation {
            scenario_name: runtime.name.clone(),
            state: runtime.state,
            snapshot: runtime.snapshot(),
            observers: runtime.observers,
        })
    }

    /// Drops one observer. The last one out cancels the tick task; state is kept.
    pub async fn release(&self, scenario_id: ScenarioId) {
        let mut scenarios = self.scenarios.lock().await;
        let Some(runtime) = scenarios.get_mut(&scenario_id) else {
            return;
        };

        runtime.observers = runtime.observers.saturating_sub(1);
        info!(
            "Scenario {} observers after disconnect = {}",
            scenario_id, runtime.observers
        );

        if runtime.observers == 0 {
            if let Some(ticker) = runtime.ticker.take() {
                ticker.cancel();
                info!(
                    "No observers left for scenario {}, stopping tick loop but keeping state",
                    scenario_id
                );
            }
        }
    }

    /// Applies a control command issued by `principal`.
    pub async fn apply(
        &self,
        scenario_id: ScenarioId,
        action: Action,
        principal: &Principal,
    ) -> Result<CommandOutcome> {
        let reloaded = if action == Action::Reset {
            if !self.scenarios.lock().await.contains_key(&scenario_id) {
                return Err(SimError::NotInitialized(scenario_id));
            }
            Some(load_scenario(self.directory(), scenario_id).await?)
        } else {
            None
        };

        let now = Utc::now();
        let mut scenarios = self.scenarios.lock().await;
        let runtime = scenarios
            .get_mut(&scenario_id)
            .ok_or(SimError::NotInitialized(scenario_id))?;

        let previous = runtime.state;
        if let Some(loaded) = reloaded {
            runtime.install(loaded);
            runtime.started_at = None;
            runtime.started_by = None;
        } else if previous.starts_run(action) {
            runtime.started_at = Some(now);
            runtime.started_by = principal.username.clone();
        }
        runtime.state = previous.apply(action);

        info!(
            "Scenario {}: {} by {} ({} -> {})",
            scenario_id,
            action,
            principal.display_name(),
            previous,
            runtime.state
        );

        let ack = ServerEvent::ControlAck {
            scenario_id,
            action,
            state: runtime.state,
            by_user: principal.username.clone(),
            timestamp: now,
            snapshot: runtime.snapshot_at(now),
        };
        let notice = ServerEvent::SimulationState {
            scenario_id,
            scenario_name: runtime.name.clone(),
            state: runtime.state,
            by_user: principal.username.clone(),
            timestamp: now,
            started_by: runtime.started_by.clone(),
            started_at: runtime.started_at,
        };

        Ok(CommandOutcome {
            previous,
            state: runtime.state,
            ack,
            notice,
        })
    }

    /// Advances every track of a running scenario by one time step.
    ///
    /// Returns the post-tick snapshot, or `None` when the scenario is not running.
    pub async fn tick(&self, scenario_id: ScenarioId) -> Result<Option<Snapshot>> {
        let mut scenarios = self.scenarios.lock().await;
        let runtime = scenarios
            .get_mut(&scenario_id)
            .ok_or(SimError::NotInitialized(scenario_id))?;

        if runtime.state != SimState::Running {
            return Ok(None);
        }

        for track in runtime.tracks.values_mut() {
            track.advance(self.tick.time_step);
        }
        Ok(Some(runtime.snapshot()))
    }

    pub async fn snapshot(&self, scenario_id: ScenarioId) -> Option<Snapshot> {
        let scenarios = self.scenarios.lock().await;
        scenarios.get(&scenario_id).map(ScenarioRuntime::snapshot)
    }

    /// Metadata of every registered scenario, ordered by id.
    pub async fn summaries(&self) -> Vec<ScenarioSummary> {
        let scenarios = self.scenarios.lock().await;
        let mut list: Vec<_> = scenarios.values().map(ScenarioRuntime::summary).collect();
        list.sort_by_key(|s| s.scenario_id);
        list
    }

    pub async fn observer_count(&self, scenario_id: ScenarioId) -> usize {
        let scenarios = self.scenarios.lock().await;
        scenarios.get(&scenario_id).map_or(0, ScenarioRuntime::observers)
    }

    /// True while a live tick task exists for the scenario.
    pub async fn is_ticking(&self, scenario_id: ScenarioId) -> bool {
        let scenarios = self.scenarios.lock().await;
        scenarios
            .get(&scenario_id)
            .and_then(|rt| rt.ticker.as_ref())
            .is_some_and(|t| !t.is_finished())
    }
}
