//! Per-connection session logic, independent of the transport.
//!
//! A [`ScenarioSession`] is one observer of one scenario: it holds the
//! principal and its control right (decided once at connect time), turns
//! inbound text into registry commands, and fans the results out through the
//! hub. A [`MonitorSession`] only listens to the global monitor group.
//!
//! Events meant for the session itself (the `info` greeting, errors) go
//! straight into its own outbound queue and never through a group.

use crate::auth::{authorize, ControlPolicy, Principal};
use crate::error::{Result, SimError};
use crate::hub::{encode, Group, Hub, Outbound, SessionId};
use crate::registry::Registry;
use chrono::Utc;
use log::{error, info, warn};
use sim_shared::{parse_action_field, Action, ScenarioId, ServerEvent};
use std::sync::Arc;
use tokio::sync::mpsc;

fn push(tx: &mpsc::UnboundedSender<Outbound>, event: &ServerEvent) -> Result<()> {
    let text = encode(event)?;
    // a closed queue means the connection is already going away
    let _ = tx.send(text);
    Ok(())
}

pub struct ScenarioSession {
    id: SessionId,
    scenario_id: ScenarioId,
    principal: Principal,
    can_control: bool,
    registry: Arc<Registry>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ScenarioSession {
    /// Authorizes the principal, registers it as an observer and greets it.
    ///
    /// On error nothing has been registered and the caller should close the
    /// connection after flushing the queue.
    pub async fn open(
        registry: Arc<Registry>,
        policy: &ControlPolicy,
        scenario_id: ScenarioId,
        token: Option<&str>,
        id: SessionId,
        tx: mpsc::UnboundedSender<Outbound>,
    ) -> Result<Self> {
        let (principal, can_control) = authorize(registry.directory(), policy, token).await?;
        let activation = registry.acquire(scenario_id).await?;

        let session = Self {
            id,
            scenario_id,
            principal,
            can_control,
            registry,
            tx,
        };

        session.send(&ServerEvent::Info {
            message: "Connected to scenario simulation".to_string(),
            scenario_id,
            scenario_name: activation.scenario_name,
            sim_state: activation.state,
            can_control,
            available_actions: Action::ALL.to_vec(),
            initial_snapshot: activation.snapshot,
        })?;

        // joined after the greeting so it is always the first event queued
        session
            .registry
            .hub()
            .join(Group::Scenario(scenario_id), id, session.tx.clone())
            .await;

        info!(
            "Session {} ({}) observing scenario {}, can_control={}",
            id,
            session.principal.display_name(),
            scenario_id,
            can_control
        );
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn can_control(&self) -> bool {
        self.can_control
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn send(&self, event: &ServerEvent) -> Result<()> {
        push(&self.tx, event)
    }

    /// Handles one inbound text frame. Failures are reported to this session only.
    pub async fn handle_text(&self, text: &str) {
        if let Err(e) = self.process(text).await {
            if e.is_client_error() {
                warn!("Session {} rejected '{}': {}", self.id, text, e);
            } else {
                error!("Session {} failed to handle '{}': {}", self.id, text, e);
            }
            if let Err(send_err) = self.send(&ServerEvent::error(e.to_string())) {
                error!("Session {} could not report error: {}", self.id, send_err);
            }
        }
    }

    async fn process(&self, text: &str) -> Result<()> {
        let Some(name) = parse_action_field(text).map_err(|_| SimError::InvalidJson)? else {
            return Ok(());
        };

        if !self.can_control {
            return Err(SimError::NotAuthorized);
        }

        let action = Action::parse(&name).ok_or(SimError::UnknownAction(name))?;
        let outcome = self
            .registry
            .apply(self.scenario_id, action, &self.principal)
            .await?;

        let hub = self.registry.hub();
        hub.publish(Group::Scenario(self.scenario_id), &outcome.ack)
            .await?;
        hub.publish(Group::Monitor, &outcome.notice).await?;
        Ok(())
    }

    /// Leaves the scenario group and drops this observer from the registry.
    pub async fn close(self) {
        self.registry
            .hub()
            .leave(Group::Scenario(self.scenario_id), self.id)
            .await;
        self.registry.release(self.scenario_id).await;
        info!(
            "Session {} left scenario {}",
            self.id, self.scenario_id
        );
    }
}

pub struct MonitorSession {
    id: SessionId,
    hub: Arc<Hub>,
}

impl MonitorSession {
    /// Joins the monitor group and sends the list of known scenarios.
    pub async fn open(
        registry: &Registry,
        id: SessionId,
        tx: mpsc::UnboundedSender<Outbound>,
    ) -> Result<Self> {
        let hub = Arc::clone(registry.hub());
        hub.join(Group::Monitor, id, tx.clone()).await;

        let simulations = registry.summaries().await;
        info!(
            "Monitor session {} connected, {} scenarios registered",
            id,
            simulations.len()
        );
        push(
            &tx,
            &ServerEvent::MonitorSnapshot {
                simulations,
                timestamp: Utc::now(),
            },
        )?;
        Ok(Self { id, hub })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub async fn close(self) {
        self.hub.leave(Group::Monitor, self.id).await;
        info!("Monitor session {} disconnected", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::FileDirectory;
    use crate::scheduler::TickConfig;
    use sim_shared::SimState;
    use tokio::time::Duration;

    const FIXTURE: &str = r#"{
        "scenarios": [{"id": 2, "name": "Harbor Watch", "aircraft": [
            {"external_id": "h1", "initial_latitude": 22.6, "initial_longitude": 120.3,
             "planned_waypoints": [{"lat": 22.7, "lon": 120.4}]}
        ]}],
        "roles": [{"name": "Viewer", "can_control_simulation": false}],
        "users": [
            {"username": "ops", "token": "ops-token", "roles": ["C2"]},
            {"username": "guest", "token": "guest-token", "roles": ["Viewer"]}
        ]
    }"#;

    fn registry() -> Arc<Registry> {
        let directory = Arc::new(FileDirectory::from_json(FIXTURE).unwrap());
        let tick = TickConfig {
            interval: Duration::from_secs(3600),
            time_step: 1.0,
        };
        Arc::new(Registry::new(directory, Arc::new(Hub::new()), tick))
    }

    fn next_event(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> ServerEvent {
        let text = rx.try_recv().expect("no event queued");
        serde_json::from_str(&text).unwrap()
    }

    async fn open(
        registry: &Arc<Registry>,
        token: Option<&str>,
    ) -> (ScenarioSession, mpsc::UnboundedReceiver<Outbound>) {
        let (id, tx, rx) = registry.hub().open_session();
        let session = ScenarioSession::open(
            Arc::clone(registry),
            &ControlPolicy::default(),
            2,
            token,
            id,
            tx,
        )
        .await
        .unwrap();
        (session, rx)
    }

    #[tokio::test]
    async fn test_info_greeting() {
        let registry = registry();
        let (session, mut rx) = open(&registry, Some("ops-token")).await;
        assert!(session.can_control());

        match next_event(&mut rx) {
            ServerEvent::Info {
                scenario_id,
                scenario_name,
                sim_state,
                can_control,
                available_actions,
                initial_snapshot,
                ..
            } => {
                assert_eq!(scenario_id, 2);
                assert_eq!(scenario_name, "Harbor Watch");
                assert_eq!(sim_state, SimState::Idle);
                assert!(can_control);
                assert_eq!(available_actions, Action::ALL.to_vec());
                assert_eq!(initial_snapshot.aircraft_count, 1);
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_start_is_rejected() {
        let registry = registry();
        let (guest, mut guest_rx) = open(&registry, Some("guest-token")).await;
        let (_ops, mut ops_rx) = open(&registry, Some("ops-token")).await;
        next_event(&mut guest_rx);
        next_event(&mut ops_rx);

        guest.handle_text(r#"{"action": "start"}"#).await;

        match next_event(&mut guest_rx) {
            ServerEvent::Error { error } => {
                assert_eq!(error, "You are not allowed to control this simulation.")
            }
            other => panic!("Unexpected event {:?}", other),
        }
        assert!(ops_rx.try_recv().is_err());
        assert_eq!(registry.summaries().await[0].state, SimState::Idle);
    }

    #[tokio::test]
    async fn test_command_broadcasts_ack_and_notice() {
        let registry = registry();
        let (watcher, mut watcher_rx) = open(&registry, None).await;
        let (ops, mut ops_rx) = open(&registry, Some("ops-token")).await;
        next_event(&mut watcher_rx);
        next_event(&mut ops_rx);

        let (monitor_id, monitor_tx, mut monitor_rx) = registry.hub().open_session();
        let monitor = MonitorSession::open(&registry, monitor_id, monitor_tx)
            .await
            .unwrap();
        match next_event(&mut monitor_rx) {
            ServerEvent::MonitorSnapshot { simulations, .. } => {
                assert_eq!(simulations.len(), 1);
                assert_eq!(simulations[0].scenario_name, "Harbor Watch");
            }
            other => panic!("Unexpected event {:?}", other),
        }

        ops.handle_text(r#"{"action": "START"}"#).await;

        for rx in [&mut watcher_rx, &mut ops_rx] {
            match next_event(rx) {
                ServerEvent::ControlAck { state, by_user, .. } => {
                    assert_eq!(state, SimState::Running);
                    assert_eq!(by_user.as_deref(), Some("ops"));
                }
                other => panic!("Unexpected event {:?}", other),
            }
        }
        match next_event(&mut monitor_rx) {
            ServerEvent::SimulationState {
                scenario_id, state, ..
            } => {
                assert_eq!(scenario_id, 2);
                assert_eq!(state, SimState::Running);
            }
            other => panic!("Unexpected event {:?}", other),
        }

        monitor.close().await;
        watcher.close().await;
        ops.close().await;
        assert_eq!(registry.observer_count(2).await, 0);
    }

    #[tokio::test]
    async fn test_bad_input() {
        let registry = registry();
        let (ops, mut rx) = open(&registry, Some("ops-token")).await;
        next_event(&mut rx);

        ops.handle_text("not json").await;
        assert_eq!(next_event(&mut rx), ServerEvent::error("Invalid JSON"));

        ops.handle_text(r#"{"action": "rewind"}"#).await;
        assert_eq!(
            next_event(&mut rx),
            ServerEvent::error("Unknown action 'rewind'")
        );

        // no action at all is ignored
        ops.handle_text(r#"{"hello": 1}"#).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.summaries().await[0].state, SimState::Idle);
    }

    #[tokio::test]
    async fn test_anonymous_cannot_control_but_watches() {
        let registry = registry();
        let (anon, mut rx) = open(&registry, None).await;
        assert!(!anon.can_control());
        assert!(!anon.principal().is_authenticated());
        match next_event(&mut rx) {
            ServerEvent::Info { can_control, .. } => assert!(!can_control),
            other => panic!("Unexpected event {:?}", other),
        }
    }
}
