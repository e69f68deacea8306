//! tier.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TierError, TierResult};
use crate::policy::Policy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub tier: TierSection,
    pub bounded: BoundedScaling,
    pub budget: BudgetScaling,
    pub simulation: SimulationConfig,
}

/// Which autoscaler drives the tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMode {
    /// One pool held between `min_services` and `max_services`.
    #[default]
    Bounded,
    /// Compute and storage pools sharing one budget.
    Budget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierSection {
    pub mode: ScalingMode,
    /// Policy tag, parsed with [`TierConfig::policy`].
    pub policy: String,
    pub scale_interval: String,
}

impl Default for TierSection {
    fn default() -> Self {
        Self {
            mode: ScalingMode::Bounded,
            policy: Policy::RoundRobin.to_string(),
            scale_interval: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundedScaling {
    pub min_services: usize,
    pub max_services: usize,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
}

impl Default for BoundedScaling {
    fn default() -> Self {
        Self {
            min_services: 2,
            max_services: 5,
            scale_up_threshold: 10.0,
            scale_down_threshold: 5.0,
        }
    }
}

impl BoundedScaling {
    pub fn validate(&self) -> TierResult<()> {
        if self.max_services == 0 {
            return Err(TierError::Config("max_services must be at least 1".into()));
        }
        if self.min_services > self.max_services {
            return Err(TierError::Config(format!(
                "min_services ({}) exceeds max_services ({})",
                self.min_services, self.max_services
            )));
        }
        validate_thresholds(self.scale_up_threshold, self.scale_down_threshold)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetScaling {
    /// Ceiling on the summed cost of every compute and storage service.
    pub total_budget: f64,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub initial_compute: usize,
    pub initial_storage: usize,
    /// Probability of growing storage rather than compute.
    pub storage_preference: f64,
    /// Budget that must remain before storage may grow.
    pub storage_min_budget: f64,
    /// Budget that must remain before compute may grow.
    pub compute_min_budget: f64,
    /// Probability of shrinking compute rather than storage.
    pub compute_removal_bias: f64,
}

impl Default for BudgetScaling {
    fn default() -> Self {
        Self {
            total_budget: 100.0,
            scale_up_threshold: 10.0,
            scale_down_threshold: 5.0,
            initial_compute: 2,
            initial_storage: 1,
            storage_preference: 0.3,
            storage_min_budget: 20.0,
            compute_min_budget: 10.0,
            compute_removal_bias: 0.7,
        }
    }
}

impl BudgetScaling {
    pub fn validate(&self) -> TierResult<()> {
        if !(self.total_budget.is_finite() && self.total_budget >= 0.0) {
            return Err(TierError::Config(format!(
                "total_budget must be a non-negative number, got {}",
                self.total_budget
            )));
        }
        if self.initial_compute == 0 || self.initial_storage == 0 {
            return Err(TierError::Config(
                "budget mode needs at least one initial compute and storage service".into(),
            ));
        }
        for (name, p) in [
            ("storage_preference", self.storage_preference),
            ("compute_removal_bias", self.compute_removal_bias),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(TierError::Config(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }
        validate_thresholds(self.scale_up_threshold, self.scale_down_threshold)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub duration: String,
    pub max_rps: u32,
    pub workers: usize,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    /// Fraction of requests a simulated service fails.
    pub failure_rate: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration: "300s".to_string(),
            max_rps: 20,
            workers: 100,
            min_latency_ms: 100,
            max_latency_ms: 500,
            failure_rate: 0.0,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> TierResult<()> {
        parse_duration(&self.duration)?;
        if self.max_rps == 0 || self.workers == 0 {
            return Err(TierError::Config("max_rps and workers must be positive".into()));
        }
        if self.min_latency_ms > self.max_latency_ms {
            return Err(TierError::Config(format!(
                "min_latency_ms ({}) exceeds max_latency_ms ({})",
                self.min_latency_ms, self.max_latency_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(TierError::Config(format!(
                "failure_rate must be within [0, 1], got {}",
                self.failure_rate
            )));
        }
        Ok(())
    }
}

impl TierConfig {
    pub fn from_file(path: &Path) -> TierResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TierError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> TierResult<Self> {
        toml::from_str(content).map_err(|e| TierError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> TierResult<String> {
        toml::to_string_pretty(self).map_err(|e| TierError::Config(e.to_string()))
    }

    /// Check every section, including the policy tag.
    pub fn validate(&self) -> TierResult<()> {
        self.policy()?;
        self.scale_interval()?;
        match self.tier.mode {
            ScalingMode::Bounded => self.bounded.validate()?,
            ScalingMode::Budget => self.budget.validate()?,
        }
        self.simulation.validate()
    }

    pub fn policy(&self) -> TierResult<Policy> {
        self.tier.policy.parse()
    }

    pub fn scale_interval(&self) -> TierResult<Duration> {
        let interval = parse_duration(&self.tier.scale_interval)?;
        if interval.is_zero() {
            return Err(TierError::Config("scale_interval must be positive".into()));
        }
        Ok(interval)
    }
}

fn validate_thresholds(up: f64, down: f64) -> TierResult<()> {
    if !(up.is_finite() && down.is_finite()) || down < 0.0 {
        return Err(TierError::Config(format!(
            "thresholds must be non-negative numbers, got up={up} down={down}"
        )));
    }
    if down > up {
        return Err(TierError::Config(format!(
            "scale_down_threshold ({down}) exceeds scale_up_threshold ({up})"
        )));
    }
    Ok(())
}

/// Parse a duration string like "250ms", "30s", "5m". A bare number is seconds.
pub fn parse_duration(s: &str) -> TierResult<Duration> {
    let s = s.trim();
    let invalid = || TierError::Config(format!("invalid duration: {s:?}"));

    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    } else {
        s.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}
