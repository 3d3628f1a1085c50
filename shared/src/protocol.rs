//! JSON messages exchanged over the scenario and monitor streams.
//!
//! Every server event carries a `type` discriminator. Clients only ever send
//! `{"action": "<name>"}` on a scenario stream.

use crate::geo::Waypoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ScenarioId = u64;

/// Run state of a scenario's simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimState {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

impl SimState {
    /// State reached by applying `action` in `self`.
    ///
    /// | from    | start   | pause  | stop    | reset |
    /// |---------|---------|--------|---------|-------|
    /// | idle    | running | idle   | idle    | idle  |
    /// | running | running | paused | stopped | idle  |
    /// | paused  | running | paused | stopped | idle  |
    /// | stopped | running | stopped| stopped | idle  |
    pub fn apply(self, action: Action) -> SimState {
        use SimState::*;
        match (self, action) {
            (_, Action::Reset) => Idle,
            (_, Action::Start) => Running,
            (Running, Action::Pause) => Paused,
            (Running | Paused, Action::Stop) => Stopped,
            (state, _) => state,
        }
    }

    /// True if `action` in this state (re)starts the run and should record who did it.
    pub fn starts_run(self, action: Action) -> bool {
        action == Action::Start && self != SimState::Running
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SimState::Idle => "idle",
            SimState::Running => "running",
            SimState::Paused => "paused",
            SimState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single simulated aircraft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Waiting,
    Moving,
    Arrived,
}

/// Control commands accepted on a scenario stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Pause,
    Stop,
    Reset,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Start, Action::Pause, Action::Stop, Action::Reset];

    /// Case-insensitive lookup by name.
    pub fn parse(name: &str) -> Option<Action> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(name.trim()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Pause => "pause",
            Action::Stop => "stop",
            Action::Reset => "reset",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracts the lower-cased `action` field from a client message.
///
/// Returns `Ok(None)` when the message parses but carries no usable action
/// (not an object, no `action` key, a non-string or an empty string).
pub fn parse_action_field(text: &str) -> Result<Option<String>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let action = value
        .get("action")
        .and_then(serde_json::Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    Ok(action)
}

/// Message a client sends to control a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub action: String,
}

/// Position as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

impl From<Waypoint> for Position {
    fn from(wp: Waypoint) -> Self {
        Self {
            latitude: wp.lat,
            longitude: wp.lon,
            altitude_m: wp.alt,
        }
    }
}

/// Per-aircraft entry of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftSnapshot {
    pub external_id: String,
    pub name: String,
    /// Status as recorded in the scenario data, not the simulated one.
    pub status_db: String,
    pub position_db: Option<Position>,
    pub sim_status: TrackStatus,
    pub sim_position: Position,
    pub ground_speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
    pub last_updated_db: Option<DateTime<Utc>>,
}

/// Point-in-time view of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub scenario_id: ScenarioId,
    pub scenario_name: String,
    pub state: SimState,
    pub timestamp: DateTime<Utc>,
    pub aircraft_count: usize,
    pub aircraft: Vec<AircraftSnapshot>,
}

/// Scenario metadata without track detail, as listed on the monitor stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub scenario_id: ScenarioId,
    pub scenario_name: String,
    pub state: SimState,
    pub started_by: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First event on a scenario stream.
    Info {
        message: String,
        scenario_id: ScenarioId,
        scenario_name: String,
        sim_state: SimState,
        can_control: bool,
        available_actions: Vec<Action>,
        initial_snapshot: Snapshot,
    },
    Snapshot(Snapshot),
    ControlAck {
        scenario_id: ScenarioId,
        action: Action,
        state: SimState,
        by_user: Option<String>,
        timestamp: DateTime<Utc>,
        snapshot: Snapshot,
    },
    /// State change notice for the monitor stream.
    SimulationState {
        scenario_id: ScenarioId,
        scenario_name: String,
        state: SimState,
        by_user: Option<String>,
        timestamp: DateTime<Utc>,
        started_by: Option<String>,
        started_at: Option<DateTime<Utc>>,
    },
    MonitorSnapshot {
        simulations: Vec<ScenarioSummary>,
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            error: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
