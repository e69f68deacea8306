//! Load balancing policy tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TierError;

/// The rule a load balancer uses to pick a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Rotate through the pool in order.
    #[default]
    RoundRobin,
    /// Pick the service with the lowest load, earliest position on ties.
    LeastConnections,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::RoundRobin => "round_robin",
            Policy::LeastConnections => "least_connections",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = TierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "round_robin" => Ok(Policy::RoundRobin),
            "least_connections" => Ok(Policy::LeastConnections),
            other => Err(TierError::UnknownPolicy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_policies() {
        assert_eq!("round_robin".parse::<Policy>().unwrap(), Policy::RoundRobin);
        assert_eq!(
            "least_connections".parse::<Policy>().unwrap(),
            Policy::LeastConnections
        );
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = "random".parse::<Policy>().unwrap_err();
        assert!(matches!(err, TierError::UnknownPolicy(ref p) if p == "random"));
    }

    #[test]
    fn display_matches_config_tag() {
        assert_eq!(Policy::LeastConnections.to_string(), "least_connections");
        assert_eq!(Policy::default(), Policy::RoundRobin);
    }
}
