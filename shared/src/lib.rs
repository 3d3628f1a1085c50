//! Types and math shared by the simulation server and its clients.
//!
//! [`geo`] holds the distance/interpolation helpers that drive track motion;
//! [`protocol`] holds the JSON events and the run-state machine that both the
//! server and the operator console speak.

pub mod geo;
pub mod protocol;

pub use geo::{distance, interpolate, leg_duration, Waypoint, EARTH_RADIUS_M};
pub use protocol::{
    parse_action_field, Action, AircraftSnapshot, ControlRequest, Position, ScenarioId,
    ScenarioSummary, ServerEvent, SimState, Snapshot, TrackStatus,
};

/// Wall-clock period between simulation ticks, in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 1000;

/// Simulated seconds applied to every track on each tick.
pub const DEFAULT_TIME_STEP_S: f64 = 1.0;

/// Speed assumed for aircraft without a recorded ground speed.
pub const DEFAULT_SPEED_MPS: f64 = 250.0;

/// Role names granted control when no explicit role flag says so.
pub const DEFAULT_CONTROL_ROLES: [&str; 4] = ["Simulation Controller", "Admin", "C2", "Primary"];
