//! The scenario directory: everything the simulator needs from the outside
//! world. It answers two questions, which aircraft fly in a scenario and who
//! is on the other end of a connection, and nothing else.
//!
//! [`FileDirectory`] serves both from a JSON fixture loaded at start-up.

use crate::auth::{Principal, RoleGrant};
use crate::error::{Result, SimError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use sim_shared::ScenarioId;
use std::collections::HashMap;
use std::path::Path;

/// One planned waypoint. Missing fields inherit the aircraft's initial position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannedWaypoint {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
}

/// An aircraft deployed in a scenario, as recorded by the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftRecord {
    pub external_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub type_name: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub initial_latitude: f64,
    pub initial_longitude: f64,
    #[serde(default)]
    pub initial_altitude_m: f64,
    #[serde(default)]
    pub planned_waypoints: Vec<PlannedWaypoint>,
    #[serde(default)]
    pub ground_speed_mps: Option<f64>,
    #[serde(default)]
    pub heading_deg: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

fn default_status() -> String {
    "waiting".to_string()
}

/// Result of a route lookup. `name` is `None` for scenarios the directory does not know.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRoutes {
    pub name: Option<String>,
    pub aircraft: Vec<AircraftRecord>,
}

/// Read-only collaborator consulted when a scenario is activated or reset and
/// when a client connects.
///
/// Implementations must be idempotent; the simulator may call them
/// repeatedly and never with its registry lock held.
#[async_trait]
pub trait ScenarioDirectory: Send + Sync {
    async fn load_routes(&self, scenario_id: ScenarioId) -> Result<ScenarioRoutes>;

    /// Maps a bearer token to a principal. No token or an unknown one is anonymous.
    async fn resolve_principal(&self, token: Option<&str>) -> Result<Principal>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioFixture {
    pub id: ScenarioId,
    pub name: String,
    #[serde(default)]
    pub aircraft: Vec<AircraftRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFixture {
    pub username: String,
    pub token: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub scenarios: Vec<ScenarioFixture>,
    #[serde(default)]
    pub roles: Vec<RoleGrant>,
    #[serde(default)]
    pub users: Vec<UserFixture>,
}

/// In-memory directory backed by a JSON fixture.
#[derive(Debug, Default)]
pub struct FileDirectory {
    scenarios: HashMap<ScenarioId, ScenarioFixture>,
    roles: HashMap<String, RoleGrant>,
    users: HashMap<String, UserFixture>,
}

impl FileDirectory {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        Self {
            scenarios: fixture.scenarios.into_iter().map(|s| (s.id, s)).collect(),
            roles: fixture
                .roles
                .into_iter()
                .map(|r| (r.name.clone(), r))
                .collect(),
            users: fixture
                .users
                .into_iter()
                .map(|u| (u.token.clone(), u))
                .collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let fixture: Fixture =
            serde_json::from_str(json).map_err(|e| SimError::Directory(e.to_string()))?;
        Ok(Self::from_fixture(fixture))
    }

    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let directory = Self::from_json(&json)?;
        info!(
            "Loaded directory {}: {} scenarios, {} users, {} roles",
            path.display(),
            directory.scenarios.len(),
            directory.users.len(),
            directory.roles.len()
        );
        Ok(directory)
    }

    fn role(&self, name: &str) -> RoleGrant {
        self.roles.get(name).cloned().unwrap_or_else(|| RoleGrant {
            name: name.to_string(),
            can_control_simulation: None,
        })
    }
}

#[async_trait]
impl ScenarioDirectory for FileDirectory {
    async fn load_routes(&self, scenario_id: ScenarioId) -> Result<ScenarioRoutes> {
        Ok(match self.scenarios.get(&scenario_id) {
            Some(scenario) => ScenarioRoutes {
                name: Some(scenario.name.clone()),
                aircraft: scenario.aircraft.clone(),
            },
            None => ScenarioRoutes::default(),
        })
    }

    async fn resolve_principal(&self, token: Option<&str>) -> Result<Principal> {
        let Some(user) = token.and_then(|t| self.users.get(t)) else {
            return Ok(Principal::anonymous());
        };
        Ok(Principal {
            username: Some(user.username.clone()),
            is_superuser: user.is_superuser,
            roles: user.roles.iter().map(|r| self.role(r)).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "scenarios": [{
            "id": 1,
            "name": "Strait Patrol",
            "aircraft": [{
                "external_id": "9b2f",
                "type_name": "F-16",
                "initial_latitude": 24.0,
                "initial_longitude": 120.0,
                "planned_waypoints": [{"lat": 24.5, "lon": 120.5}]
            }]
        }],
        "roles": [{"name": "Radar Operator", "can_control_simulation": false}],
        "users": [{"username": "lin", "token": "t-lin", "roles": ["Radar Operator", "C2"]}]
    }"#;

    #[tokio::test]
    async fn test_load_known_scenario() {
        let directory = FileDirectory::from_json(FIXTURE).unwrap();
        let routes = directory.load_routes(1).await.unwrap();

        assert_eq!(routes.name.as_deref(), Some("Strait Patrol"));
        assert_eq!(routes.aircraft.len(), 1);

        let record = &routes.aircraft[0];
        assert_eq!(record.status, "waiting");
        assert_eq!(record.initial_altitude_m, 0.0);
        assert_eq!(record.planned_waypoints[0].alt, None);
    }

    #[tokio::test]
    async fn test_load_unknown_scenario_is_empty() {
        let directory = FileDirectory::from_json(FIXTURE).unwrap();
        let routes = directory.load_routes(99).await.unwrap();
        assert!(routes.name.is_none());
        assert!(routes.aircraft.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_principal() {
        let directory = FileDirectory::from_json(FIXTURE).unwrap();

        let lin = directory.resolve_principal(Some("t-lin")).await.unwrap();
        assert_eq!(lin.username.as_deref(), Some("lin"));
        assert_eq!(lin.roles.len(), 2);
        assert_eq!(lin.roles[0].can_control_simulation, Some(false));
        // roles missing from the role table carry no flag
        assert_eq!(lin.roles[1].name, "C2");
        assert_eq!(lin.roles[1].can_control_simulation, None);

        let nobody = directory.resolve_principal(Some("bogus")).await.unwrap();
        assert!(!nobody.is_authenticated());
        let missing = directory.resolve_principal(None).await.unwrap();
        assert!(!missing.is_authenticated());
    }

    #[test]
    fn test_bad_fixture() {
        let err = FileDirectory::from_json("{\"scenarios\": 3}").unwrap_err();
        assert!(matches!(err, SimError::Directory(_)));
    }
}
