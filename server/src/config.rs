use crate::auth::ControlPolicy;
use crate::scheduler::TickConfig;
use sim_shared::DEFAULT_CONTROL_ROLES;
use std::path::PathBuf;

/// Settings for one simulation server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` to listen on. Port 0 picks a free one.
    pub bind_addr: String,
    pub tick: TickConfig,
    /// Role names that grant control when no role flag does.
    pub control_roles: Vec<String>,
    /// JSON fixture backing the scenario directory.
    pub data: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            tick: TickConfig::default(),
            control_roles: DEFAULT_CONTROL_ROLES.iter().map(|r| r.to_string()).collect(),
            data: None,
        }
    }
}

impl ServerConfig {
    pub fn control_policy(&self) -> ControlPolicy {
        ControlPolicy::new(self.control_roles.iter().cloned())
    }
}

/// Splits a comma-separated role list, dropping blanks.
pub fn parse_role_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accepts only a finite, positive number of simulated seconds per tick.
pub fn parse_time_step(value: &str) -> Result<f64, String> {
    let step: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("'{}' is not a number: {}", value, e))?;
    if !step.is_finite() || step <= 0.0 {
        return Err(format!("time step must be a positive number, got {}", value));
    }
    Ok(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8000");
        assert_eq!(config.tick.interval.as_millis(), 1000);
        assert_eq!(config.tick.time_step, 1.0);
        assert_eq!(config.control_roles.len(), 4);
        assert!(config.data.is_none());
    }

    #[test]
    fn test_parse_role_list() {
        assert_eq!(
            parse_role_list(" Admin, C2 ,,Flight Director"),
            vec!["Admin", "C2", "Flight Director"]
        );
        assert!(parse_role_list("").is_empty());
    }

    #[test]
    fn test_policy_uses_configured_roles() {
        let config = ServerConfig {
            control_roles: vec!["Tower".to_string()],
            ..ServerConfig::default()
        };
        let policy = config.control_policy();
        assert!(policy.can_control(&Principal::user("t").with_role("Tower", None)));
        assert!(!policy.can_control(&Principal::user("a").with_role("Admin", None)));
    }

    #[test]
    fn test_parse_time_step() {
        assert_eq!(parse_time_step("1.0"), Ok(1.0));
        assert_eq!(parse_time_step(" 0.25 "), Ok(0.25));
        assert!(parse_time_step("0").is_err());
        assert!(parse_time_step("-1.5").is_err());
        assert!(parse_time_step("NaN").is_err());
        assert!(parse_time_step("inf").is_err());
        assert!(parse_time_step("fast").is_err());
    }
}
