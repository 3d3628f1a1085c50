//! Decides whether a connected principal may issue control commands.
//!
//! The decision is an ordered chain of predicates; the first one that grants
//! wins. Anonymous principals never reach the chain.

use crate::directory::ScenarioDirectory;
use crate::error::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sim_shared::DEFAULT_CONTROL_ROLES;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub name: String,
    /// `None` when the role store has no opinion.
    #[serde(default)]
    pub can_control_simulation: Option<bool>,
}

/// Who is on the other end of a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    /// `None` for anonymous connections.
    pub username: Option<String>,
    pub is_superuser: bool,
    pub roles: Vec<RoleGrant>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, name: impl Into<String>, flag: Option<bool>) -> Self {
        self.roles.push(RoleGrant {
            name: name.into(),
            can_control_simulation: flag,
        });
        self
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("anonymous")
    }
}

/// Why control was granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    Superuser,
    RoleFlag(String),
    RoleName(String),
}

type Predicate = fn(&ControlPolicy, &Principal) -> Option<Grant>;

/// Checked in order; any match grants control.
const CHAIN: [Predicate; 3] = [superuser, role_flag, role_name];

fn superuser(_: &ControlPolicy, principal: &Principal) -> Option<Grant> {
    principal.is_superuser.then_some(Grant::Superuser)
}

fn role_flag(_: &ControlPolicy, principal: &Principal) -> Option<Grant> {
    principal
        .roles
        .iter()
        .find(|r| r.can_control_simulation == Some(true))
        .map(|r| Grant::RoleFlag(r.name.clone()))
}

fn role_name(policy: &ControlPolicy, principal: &Principal) -> Option<Grant> {
    principal
        .roles
        .iter()
        .find(|r| policy.control_role_names.contains(&r.name))
        .map(|r| Grant::RoleName(r.name.clone()))
}

#[derive(Debug, Clone)]
pub struct ControlPolicy {
    control_role_names: HashSet<String>,
}

impl Default for ControlPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CONTROL_ROLES)
    }
}

impl ControlPolicy {
    /// `role_names` is the fallback allow-list matched against role names.
    pub fn new<I, S>(role_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            control_role_names: role_names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn evaluate(&self, principal: &Principal) -> Option<Grant> {
        if !principal.is_authenticated() {
            return None;
        }
        CHAIN.iter().find_map(|predicate| predicate(self, principal))
    }

    pub fn can_control(&self, principal: &Principal) -> bool {
        let grant = self.evaluate(principal);
        match &grant {
            Some(g) => debug!("{} may control simulations ({:?})", principal.display_name(), g),
            None => debug!("{} may not control simulations", principal.display_name()),
        }
        grant.is_some()
    }
}

/// Resolves the principal behind `token` and decides its control right once.
pub async fn authorize(
    directory: &dyn ScenarioDirectory,
    policy: &ControlPolicy,
    token: Option<&str>,
) -> Result<(Principal, bool)> {
    let principal = directory.resolve_principal(token).await?;
    let can_control = policy.can_control(&principal);
    info!(
        "Principal {} authenticated={} can_control={}",
        principal.display_name(),
        principal.is_authenticated(),
        can_control
    );
    Ok((principal, can_control))
}
