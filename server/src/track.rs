//! In-memory state of one simulated aircraft.

use crate::directory::AircraftRecord;
use crate::error::{Result, SimError};
use chrono::{DateTime, Utc};
use sim_shared::{
    interpolate, leg_duration, AircraftSnapshot, TrackStatus, Waypoint, DEFAULT_SPEED_MPS,
};

#[derive(Debug, Clone)]
pub struct Track {
    pub external_id: String,
    pub name: String,
    /// Status string as recorded by the directory, reported verbatim.
    pub status_db: String,
    route: Vec<Waypoint>,
    segment_index: usize,
    segment_t: f64,
    segment_duration_s: f64,
    speed_mps: f64,
    status: TrackStatus,
    position: Waypoint,
    ground_speed_mps: Option<f64>,
    heading_deg: Option<f64>,
    last_updated_db: Option<DateTime<Utc>>,
}

impl Track {
    /// Builds a track at the start of `route`. The route must not be empty.
    pub fn new(
        external_id: impl Into<String>,
        name: impl Into<String>,
        route: Vec<Waypoint>,
        speed_mps: f64,
    ) -> Result<Self> {
        let external_id = external_id.into();
        let (first, second) = match route.as_slice() {
            [] => {
                return Err(SimError::InvalidRoute(format!(
                    "track {} has no waypoints",
                    external_id
                )))
            }
            [first] => (*first, None),
            [first, second, ..] => (*first, Some(*second)),
        };

        let (status, segment_duration_s) = match second {
            Some(next) => (TrackStatus::Moving, leg_duration(&first, &next, speed_mps)),
            None => (TrackStatus::Waiting, 1.0),
        };

        Ok(Self {
            external_id,
            name: name.into(),
            status_db: "waiting".to_string(),
            route,
            segment_index: 0,
            segment_t: 0.0,
            segment_duration_s,
            speed_mps,
            status,
            position: first,
            ground_speed_mps: None,
            heading_deg: None,
            last_updated_db: None,
        })
    }

    /// Builds the route `[initial position] + planned waypoints` for a directory record.
    pub fn from_record(record: &AircraftRecord) -> Result<Self> {
        let origin = Waypoint::new(
            record.initial_latitude,
            record.initial_longitude,
            record.initial_altitude_m,
        );

        let mut route = Vec::with_capacity(record.planned_waypoints.len() + 1);
        route.push(origin);
        route.extend(record.planned_waypoints.iter().map(|wp| {
            Waypoint::new(
                wp.lat.unwrap_or(origin.lat),
                wp.lon.unwrap_or(origin.lon),
                wp.alt.unwrap_or(origin.alt),
            )
        }));

        let name = if record.name.is_empty() {
            record.type_name.clone()
        } else {
            record.name.clone()
        };
        // a recorded zero means the speed was never filled in
        let speed = record
            .ground_speed_mps
            .filter(|s| *s != 0.0)
            .unwrap_or(DEFAULT_SPEED_MPS);

        let mut track = Self::new(record.external_id.clone(), name, route, speed)?;
        track.status_db = record.status.clone();
        track.ground_speed_mps = record.ground_speed_mps;
        track.heading_deg = record.heading_deg;
        track.last_updated_db = record.last_updated;
        Ok(track)
    }

    /// Moves the track `dt` seconds along its route.
    ///
    /// Progress left over when a leg completes is dropped; the next leg starts at 0.
    pub fn advance(&mut self, dt: f64) {
        if self.route.len() <= 1 {
            self.position = self.route[0];
            self.status = TrackStatus::Waiting;
            return;
        }
        if self.status == TrackStatus::Arrived {
            return;
        }

        let last_leg = self.route.len() - 2;
        if self.segment_index > last_leg {
            self.arrive(last_leg);
            return;
        }

        self.segment_t += dt / self.segment_duration_s;

        if self.segment_t >= 1.0 {
            if self.segment_index == last_leg {
                self.arrive(last_leg);
                return;
            }
            self.segment_index += 1;
            self.segment_t = 0.0;
            let (from, to) = self.leg();
            self.segment_duration_s = leg_duration(&from, &to, self.speed_mps);
        }

        let (from, to) = self.leg();
        self.position = interpolate(&from, &to, self.segment_t);
        self.status = TrackStatus::Moving;
    }

    fn leg(&self) -> (Waypoint, Waypoint) {
        (
            self.route[self.segment_index],
            self.route[self.segment_index + 1],
        )
    }

    fn arrive(&mut self, last_leg: usize) {
        self.segment_index = last_leg;
        self.segment_t = 1.0;
        self.position = self.route[self.route.len() - 1];
        self.status = TrackStatus::Arrived;
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn position(&self) -> Waypoint {
        self.position
    }

    pub fn route(&self) -> &[Waypoint] {
        &self.route
    }

    pub fn segment_index(&self) -> usize {
        self.segment_index
    }

    pub fn segment_t(&self) -> f64 {
        self.segment_t
    }

    pub fn segment_duration_s(&self) -> f64 {
        self.segment_duration_s
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_mps
    }

    pub fn snapshot(&self) -> AircraftSnapshot {
        AircraftSnapshot {
            external_id: self.external_id.clone(),
            name: self.name.clone(),
            status_db: self.status_db.clone(),
            position_db: None,
            sim_status: self.status,
            sim_position: self.position.into(),
            ground_speed_mps: self.ground_speed_mps,
            heading_deg: self.heading_deg,
            last_updated_db: self.last_updated_db,
        }
    }
}
