//! Geodesy helpers used to move tracks along their routes.
//!
//! Distances are great-circle (haversine) while interpolation is a plain
//! linear blend of latitude, longitude and altitude. The two models do not
//! agree on long legs: an aircraft covers the flat-blended path in the time
//! the spherical distance predicts, so apparent speed drifts slightly along
//! the leg. Observable timing depends on this, so it is kept as is.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Speeds below this are treated as this value when estimating leg durations.
pub const MIN_SPEED_MPS: f64 = 1.0;

/// Every leg takes at least this long, so a track always makes progress.
pub const MIN_LEG_DURATION_S: f64 = 1.0;

/// A point on a route. Altitude is in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl Waypoint {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }
}

/// Great-circle distance between two points in meters.
pub fn distance(p1: &Waypoint, p2: &Waypoint) -> f64 {
    let phi1 = p1.lat.to_radians();
    let phi2 = p2.lat.to_radians();
    let d_phi = (p2.lat - p1.lat).to_radians();
    let d_lambda = (p2.lon - p1.lon).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Blends `p1` towards `p2` by `t`, clamped to `[0, 1]`.
///
/// Written as `p1 * (1 - t) + p2 * t` so both endpoints are reproduced exactly.
pub fn interpolate(p1: &Waypoint, p2: &Waypoint, t: f64) -> Waypoint {
    let t = t.clamp(0.0, 1.0);
    let s = 1.0 - t;
    Waypoint {
        lat: p1.lat * s + p2.lat * t,
        lon: p1.lon * s + p2.lon * t,
        alt: p1.alt * s + p2.alt * t,
    }
}

/// Seconds needed to fly from `p1` to `p2` at `speed_mps`.
///
/// Coincident points cost one tick's worth of time instead of zero.
pub fn leg_duration(p1: &Waypoint, p2: &Waypoint, speed_mps: f64) -> f64 {
    let speed = speed_mps.max(MIN_SPEED_MPS);
    let meters = distance(p1, p2);
    if meters <= 0.0 {
        return MIN_LEG_DURATION_S;
    }
    (meters / speed).max(MIN_LEG_DURATION_S)
}
