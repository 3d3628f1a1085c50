//! Named subscriber groups and fan-out of server events.
//!
//! Each connected session owns one outbound queue. The hub keeps a clone of
//! that queue's sender in every group the session has joined, so publishing
//! to a group is a matter of encoding the event once and pushing the same
//! text into each member's queue.
//!
//! Delivery is best effort: a member whose queue has gone away is dropped from
//! the group on the next publish. No ordering is promised across members.

use crate::error::Result;
use log::debug;
use sim_shared::{ScenarioId, ServerEvent};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Encoded event text, shared between all recipients of one publish.
pub type Outbound = Arc<str>;

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Scenario(ScenarioId),
    Monitor,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Group::Scenario(id) => write!(f, "scenario:{}", id),
            Group::Monitor => f.write_str("monitor"),
        }
    }
}

pub fn encode(event: &ServerEvent) -> Result<Outbound> {
    Ok(Arc::from(event.to_json()?))
}

pub struct Hub {
    next_session_id: AtomicU64,
    groups: RwLock<HashMap<Group, HashMap<SessionId, mpsc::UnboundedSender<Outbound>>>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            next_session_id: AtomicU64::new(1),
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Allocates a session id and its outbound queue.
    pub fn open_session(
        &self,
    ) -> (
        SessionId,
        mpsc::UnboundedSender<Outbound>,
        mpsc::UnboundedReceiver<Outbound>,
    ) {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        (id, tx, rx)
    }

    pub async fn join(
        &self,
        group: Group,
        session: SessionId,
        tx: mpsc::UnboundedSender<Outbound>,
    ) {
        let mut groups = self.groups.write().await;
        groups.entry(group).or_default().insert(session, tx);
        debug!("Session {} joined {}", session, group);
    }

    pub async fn leave(&self, group: Group, session: SessionId) {
        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(&group) {
            members.remove(&session);
            if members.is_empty() {
                groups.remove(&group);
            }
        }
        debug!("Session {} left {}", session, group);
    }

    /// Sends `event` to every current member of `group`. Returns the number reached.
    pub async fn publish(&self, group: Group, event: &ServerEvent) -> Result<usize> {
        let text = encode(event)?;
        Ok(self.publish_encoded(group, text).await)
    }

    pub async fn publish_encoded(&self, group: Group, text: Outbound) -> usize {
        let members: Vec<(SessionId, mpsc::UnboundedSender<Outbound>)> = {
            let groups = self.groups.read().await;
            match groups.get(&group) {
                Some(members) => members.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        let mut gone = Vec::new();
        for (id, tx) in members {
            if tx.send(Arc::clone(&text)).is_ok() {
                delivered += 1;
            } else {
                gone.push(id);
            }
        }

        for id in gone {
            self.leave(group, id).await;
        }
        delivered
    }

    pub async fn member_count(&self, group: Group) -> usize {
        let groups = self.groups.read().await;
        groups.get(&group).map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_names() {
        assert_eq!(Group::Scenario(12).to_string(), "scenario:12");
        assert_eq!(Group::Monitor.to_string(), "monitor");
    }

    #[tokio::test]
    async fn test_publish_reaches_group_members_only() {
        let hub = Hub::new();
        let (a, a_tx, mut a_rx) = hub.open_session();
        let (b, b_tx, mut b_rx) = hub.open_session();
        let (m, m_tx, mut m_rx) = hub.open_session();
        assert_ne!(a, b);

        hub.join(Group::Scenario(1), a, a_tx).await;
        hub.join(Group::Scenario(2), b, b_tx).await;
        hub.join(Group::Monitor, m, m_tx).await;

        let reached = hub
            .publish(Group::Scenario(1), &ServerEvent::error("one"))
            .await
            .unwrap();
        assert_eq!(reached, 1);

        assert!(a_rx.try_recv().unwrap().contains("\"one\""));
        assert!(b_rx.try_recv().is_err());
        assert!(m_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_and_dead_members() {
        let hub = Hub::new();
        let (a, a_tx, a_rx) = hub.open_session();
        let (b, b_tx, mut b_rx) = hub.open_session();
        hub.join(Group::Monitor, a, a_tx).await;
        hub.join(Group::Monitor, b, b_tx).await;
        assert_eq!(hub.member_count(Group::Monitor).await, 2);

        // a's queue is gone; the publish prunes it
        drop(a_rx);
        let reached = hub
            .publish(Group::Monitor, &ServerEvent::error("x"))
            .await
            .unwrap();
        assert_eq!(reached, 1);
        assert_eq!(hub.member_count(Group::Monitor).await, 1);
        assert!(b_rx.try_recv().is_ok());

        hub.leave(Group::Monitor, b).await;
        assert_eq!(hub.member_count(Group::Monitor).await, 0);
        let reached = hub
            .publish(Group::Monitor, &ServerEvent::error("y"))
            .await
            .unwrap();
        assert_eq!(reached, 0);
    }
}
