//! Scale events — the record of every scaling decision.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// What a single `check_and_scale()` call did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScaleAction {
    Added {
        tier: String,
        service_id: String,
    },
    Removed {
        tier: String,
        service_id: String,
    },
    /// The factory produced a service the remaining budget cannot pay for.
    BudgetExceeded {
        tier: String,
        service_id: String,
        cost: f64,
        available: f64,
    },
    /// A new service could not be started or added to its pool.
    Failed {
        tier: String,
        service_id: String,
        error: String,
    },
    NoChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSize {
    pub tier: String,
    pub size: usize,
}

/// Structured record of one scaling check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleEvent {
    pub action: ScaleAction,
    /// Average load observed before acting.
    pub avg_load: f64,
    /// Pool sizes after acting.
    pub pool_sizes: Vec<PoolSize>,
    /// Budget left when the decision was made, for budget-constrained scalers.
    pub available_budget: Option<f64>,
}

impl ScaleEvent {
    /// Whether pool membership changed.
    pub fn is_change(&self) -> bool {
        matches!(
            self.action,
            ScaleAction::Added { .. } | ScaleAction::Removed { .. }
        )
    }

    pub fn size_of(&self, tier: &str) -> Option<usize> {
        self.pool_sizes
            .iter()
            .find(|p| p.tier == tier)
            .map(|p| p.size)
    }
}

/// Logs scale events and fans them out to subscribers.
pub(crate) struct EventSink {
    tx: broadcast::Sender<ScaleEvent>,
}

impl EventSink {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ScaleEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: &ScaleEvent) {
        let sizes = format_sizes(&event.pool_sizes);
        match &event.action {
            ScaleAction::Added { tier, service_id } => info!(
                %tier,
                %service_id,
                pools = %sizes,
                avg_load = event.avg_load,
                available_budget = ?event.available_budget,
                "scaling up"
            ),
            ScaleAction::Removed { tier, service_id } => info!(
                %tier,
                %service_id,
                pools = %sizes,
                avg_load = event.avg_load,
                available_budget = ?event.available_budget,
                "scaling down"
            ),
            ScaleAction::BudgetExceeded {
                tier,
                service_id,
                cost,
                available,
            } => warn!(
                %tier,
                %service_id,
                cost,
                available,
                pools = %sizes,
                "scale-up rejected: over budget"
            ),
            ScaleAction::Failed {
                tier,
                service_id,
                error,
            } => warn!(%tier, %service_id, %error, pools = %sizes, "scale-up failed"),
            ScaleAction::NoChange => debug!(
                pools = %sizes,
                avg_load = event.avg_load,
                available_budget = ?event.available_budget,
                "no scaling needed"
            ),
        }

        // No subscribers is fine.
        let _ = self.tx.send(event.clone());
    }
}

fn format_sizes(sizes: &[PoolSize]) -> String {
    sizes
        .iter()
        .map(|p| format!("{}={}", p.tier, p.size))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(action: ScaleAction) -> ScaleEvent {
        ScaleEvent {
            action,
            avg_load: 12.0,
            pool_sizes: vec![
                PoolSize {
                    tier: "web".into(),
                    size: 3,
                },
                PoolSize {
                    tier: "db".into(),
                    size: 1,
                },
            ],
            available_budget: Some(40.0),
        }
    }

    #[test]
    fn only_membership_changes_count_as_change() {
        assert!(event(ScaleAction::Added {
            tier: "web".into(),
            service_id: "web-1".into()
        })
        .is_change());
        assert!(!event(ScaleAction::NoChange).is_change());
        assert!(!event(ScaleAction::BudgetExceeded {
            tier: "db".into(),
            service_id: "db-9".into(),
            cost: 50.0,
            available: 40.0,
        })
        .is_change());
    }

    #[test]
    fn size_of_looks_up_tier() {
        let e = event(ScaleAction::NoChange);
        assert_eq!(e.size_of("web"), Some(3));
        assert_eq!(e.size_of("db"), Some(1));
        assert_eq!(e.size_of("cache"), None);
    }

    #[test]
    fn serializes_with_action_kind() {
        let json = serde_json::to_value(event(ScaleAction::Removed {
            tier: "web".into(),
            service_id: "web-2".into(),
        }))
        .unwrap();
        assert_eq!(json["action"]["kind"], "removed");
        assert_eq!(json["action"]["service_id"], "web-2");
        assert_eq!(json["available_budget"], 40.0);
    }

    #[tokio::test]
    async fn emit_reaches_subscribers() {
        let sink = EventSink::new();
        let mut rx = sink.subscribe();
        sink.emit(&event(ScaleAction::NoChange));
        assert_eq!(rx.recv().await.unwrap(), event(ScaleAction::NoChange));
    }

    #[test]
    fn emit_without_subscribers_is_harmless() {
        EventSink::new().emit(&event(ScaleAction::NoChange));
    }
}
