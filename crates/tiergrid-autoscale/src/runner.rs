//! Periodic scaling loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use crate::scaler::Autoscaler;

/// An autoscaler shared between the background loop and on-demand callers.
pub type SharedAutoscaler = Arc<Mutex<Box<dyn Autoscaler>>>;

/// Run `check_and_scale()` every `interval` until `shutdown` flips to true
/// or its sender is dropped.
///
/// The first check happens one interval after start.
pub async fn run_scaling_loop(
    scaler: SharedAutoscaler,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_ms = interval.as_millis() as u64, "autoscaler started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let event = scaler.lock().await.check_and_scale().await;
                debug!(changed = event.is_change(), "scaling check complete");
            }
            _ = shutdown.changed() => {
                info!("autoscaler shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    use crate::event::{ScaleAction, ScaleEvent};

    struct Counting {
        checks: Arc<AtomicUsize>,
        tx: broadcast::Sender<ScaleEvent>,
    }

    #[async_trait]
    impl Autoscaler for Counting {
        async fn check_and_scale(&mut self) -> ScaleEvent {
            self.checks.fetch_add(1, Ordering::SeqCst);
            ScaleEvent {
                action: ScaleAction::NoChange,
                avg_load: 0.0,
                pool_sizes: Vec::new(),
                available_budget: None,
            }
        }

        fn subscribe(&self) -> broadcast::Receiver<ScaleEvent> {
            self.tx.subscribe()
        }
    }

    fn counting() -> (SharedAutoscaler, Arc<AtomicUsize>) {
        let checks = Arc::new(AtomicUsize::new(0));
        let (tx, _) = broadcast::channel(4);
        let scaler: Box<dyn Autoscaler> = Box::new(Counting {
            checks: checks.clone(),
            tx,
        });
        (Arc::new(Mutex::new(scaler)), checks)
    }

    #[tokio::test(start_paused = true)]
    async fn checks_once_per_interval() {
        let (scaler, checks) = counting();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_scaling_loop(scaler, Duration::from_secs(5), rx));

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        assert_eq!(checks.load(Ordering::SeqCst), 2);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_shutdown_signal() {
        let (scaler, checks) = counting();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_scaling_loop(scaler, Duration::from_secs(5), rx));

        tx.send(true).unwrap();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_sender_dropped() {
        let (scaler, _checks) = counting();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_scaling_loop(scaler, Duration::from_secs(5), rx));

        drop(tx);
        handle.await.unwrap();
    }
}
